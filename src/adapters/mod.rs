// 對外系統的具體實作：本機檔案、CSV 帳冊、狀態儲存（JSON / HTTP）、匯出

pub mod csv_ledger;
pub mod export;
pub mod http_store;
pub mod json_store;
pub mod local_storage;
