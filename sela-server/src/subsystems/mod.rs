pub mod dialogue;
pub mod export;
pub mod persist;
pub mod storage;
pub mod synthesis;
