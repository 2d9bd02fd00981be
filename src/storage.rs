//!
//! nfsgate storage module
//! ----------------------
//! JSON-document persistence for the administrative resources. Each collection
//! (users, roles, audit trail) is one JSON array file owned by exactly one
//! `DocumentStore`. Access is whole-document: load, mutate in memory, save.
//!
//! Key responsibilities:
//! - Serializing every load-mutate-save sequence on a store through one lock.
//! - Atomic replacement of the backing file so readers never see a torn write.
//! - Uniqueness checks on insert/replace via the `Document` trait.
//!
//! Stores are independent: holding the roles lock never blocks the users store.

use std::fmt::Display;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};

pub mod atomic;
pub mod settings;

pub use settings::SettingsStore;

/// A record kept in a `DocumentStore`.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Id: PartialEq + Display + Clone + Send + Sync;

    /// Human-readable collection label used in error messages ("role", "user").
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    /// Uniqueness rule between two records. Default: equal ids clash.
    fn conflict_with(&self, other: &Self) -> Option<AppError> {
        if self.id() == other.id() {
            Some(AppError::conflict(
                format!("{}_exists", Self::KIND),
                format!("{} {} already exists", Self::KIND, self.id()),
            ))
        } else {
            None
        }
    }
}

/// One JSON array file guarded by one exclusivity lock.
pub struct DocumentStore<T: Document> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> DocumentStore<T> {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()), _marker: PhantomData }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Create the backing file as an empty array when absent.
    pub fn ensure_exists(&self) -> AppResult<()> {
        let _guard = self.lock.lock();
        if self.path.exists() {
            return Ok(());
        }
        self.save_unlocked(&[])
    }

    /// Read and decode the whole collection. A missing file is a storage error.
    pub fn load(&self) -> AppResult<Vec<T>> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Replace the whole collection.
    pub fn save(&self, items: &[T]) -> AppResult<()> {
        let _guard = self.lock.lock();
        self.save_unlocked(items)
    }

    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> AppResult<R>) -> AppResult<R> {
        let _guard = self.lock.lock();
        let items = self.load_unlocked()?;
        f(&items)
    }

    /// Lock, load, apply `f`, save, unlock. When `f` fails nothing is written.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Vec<T>) -> AppResult<R>) -> AppResult<R> {
        let _guard = self.lock.lock();
        let mut items = self.load_unlocked()?;
        let out = f(&mut items)?;
        self.save_unlocked(&items)?;
        Ok(out)
    }

    pub fn list(&self) -> AppResult<Vec<T>> { self.load() }

    pub fn get(&self, id: &T::Id) -> AppResult<T> {
        self.read(|items| {
            items.iter().find(|it| &it.id() == id).cloned().ok_or_else(|| not_found::<T>(id))
        })
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> AppResult<Option<T>> {
        self.read(|items| Ok(items.iter().find(|it| pred(it)).cloned()))
    }

    pub fn insert(&self, item: T) -> AppResult<T> {
        self.mutate(|items| {
            if let Some(err) = items.iter().find_map(|existing| item.conflict_with(existing)) {
                return Err(err);
            }
            items.push(item.clone());
            Ok(item)
        })
    }

    /// Overwrite the record with the same id.
    pub fn replace(&self, item: T) -> AppResult<T> {
        let id = item.id();
        self.update(&id, move |slot| {
            *slot = item;
            Ok(())
        })
    }

    /// Edit one record in place; the result is re-checked against the others.
    pub fn update(&self, id: &T::Id, f: impl FnOnce(&mut T) -> AppResult<()>) -> AppResult<T> {
        self.mutate(|items| {
            let idx = items.iter().position(|it| &it.id() == id).ok_or_else(|| not_found::<T>(id))?;
            let mut next = items[idx].clone();
            f(&mut next)?;
            let clash = items
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .find_map(|(_, other)| next.conflict_with(other));
            if let Some(err) = clash {
                return Err(err);
            }
            items[idx] = next.clone();
            Ok(next)
        })
    }

    pub fn remove(&self, id: &T::Id) -> AppResult<T> {
        self.mutate(|items| {
            let idx = items.iter().position(|it| &it.id() == id).ok_or_else(|| not_found::<T>(id))?;
            Ok(items.remove(idx))
        })
    }

    /// Remove every record whose id is listed; absent ids are skipped.
    pub fn remove_many(&self, ids: &[T::Id]) -> AppResult<Vec<T>> {
        self.mutate(|items| {
            let mut removed = Vec::new();
            items.retain(|it| {
                if ids.contains(&it.id()) {
                    removed.push(it.clone());
                    false
                } else {
                    true
                }
            });
            Ok(removed)
        })
    }

    fn load_unlocked(&self) -> AppResult<Vec<T>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::storage("storage_read_failed", format!("read {}: {}", self.path.display(), e))
        })?;
        let items: Vec<T> = serde_json::from_str(&raw).map_err(|e| {
            AppError::storage("storage_decode_failed", format!("decode {}: {}", self.path.display(), e))
        })?;
        debug!(target: "storage", kind = T::KIND, count = items.len(), "loaded {}", self.path.display());
        Ok(items)
    }

    fn save_unlocked(&self, items: &[T]) -> AppResult<()> {
        let body = serde_json::to_vec_pretty(items).map_err(|e| {
            AppError::storage("storage_encode_failed", format!("encode {}: {}", T::KIND, e))
        })?;
        atomic::write_atomic(&self.path, &body).map_err(|e| {
            AppError::storage("storage_write_failed", format!("write {}: {}", self.path.display(), e))
        })?;
        debug!(target: "storage", kind = T::KIND, count = items.len(), "saved {}", self.path.display());
        Ok(())
    }
}

fn not_found<T: Document>(id: &T::Id) -> AppError {
    AppError::not_found(format!("{}_not_found", T::KIND), format!("{} {} not found", T::KIND, id))
}

#[cfg(test)]
#[path = "storage/storage_tests.rs"]
mod storage_tests;
