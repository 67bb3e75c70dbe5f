#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("storage unavailable")]
    Unavailable,
}

/// Resource-storage collaborator. Invoked only after access-token validation;
/// its behaviour beyond this contract is out of scope for the core.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn write(&self, path: &str, body: &[u8]) -> Result<(), StorageError>;

    async fn create(&self, path: &str, body: &[u8]) -> Result<(), StorageError>;

    async fn append(&self, path: &str, body: &[u8]) -> Result<(), StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-process storage used by tests and development setups.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    resources: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        match self.resources.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_owned()))
    }

    async fn write(&self, path: &str, body: &[u8]) -> Result<(), StorageError> {
        self.lock().insert(path.to_owned(), body.to_vec());
        Ok(())
    }

    async fn create(&self, path: &str, body: &[u8]) -> Result<(), StorageError> {
        self.lock().insert(path.to_owned(), body.to_vec());
        Ok(())
    }

    async fn append(&self, path: &str, body: &[u8]) -> Result<(), StorageError> {
        let mut resources = self.lock();
        match resources.get_mut(path) {
            Some(existing) => {
                existing.extend_from_slice(body);
                Ok(())
            }
            None => Err(StorageError::NotFound(path.to_owned())),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_owned()))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.lock().contains_key(path))
    }
}
