// 領域層：識別碼、資料模型與對外介面（ports）

pub mod keys;
pub mod model;
pub mod ports;
