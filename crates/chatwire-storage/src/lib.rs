pub mod db;
pub mod entities;
pub mod storage;

pub use storage::{
    ADMIN_USER_ID, ChatStorage, ModelInput, ModelPatch, NewMessage, StorageError, StorageResult,
    hash_token,
};
