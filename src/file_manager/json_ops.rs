// Atomic JSON file operations for settings and the job registry

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

lazy_static::lazy_static! {
    static ref FILE_LOCK: Mutex<()> = Mutex::new(());
}

fn read_unlocked<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path, e))
}

fn write_unlocked<T: Serialize>(path: &Path, data: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {:?}: {}", parent, e))?;
    }

    let json_string = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Failed to serialize data: {}", e))?;

    let temp_path = path.with_extension("json.tmp");

    let mut temp_file = File::create(&temp_path)
        .map_err(|e| format!("Failed to create temp file {:?}: {}", temp_path, e))?;

    temp_file
        .write_all(json_string.as_bytes())
        .map_err(|e| format!("Failed to write to temp file: {}", e))?;

    temp_file
        .sync_all()
        .map_err(|e| format!("Failed to sync temp file: {}", e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename temp file to {:?}: {}", path, e))
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let _lock = FILE_LOCK.lock();

    if !path.exists() {
        return Err(format!("File not found: {:?}", path));
    }

    read_unlocked(path)
}

/// Writes JSON atomically using write-to-temp-then-rename
pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<(), String> {
    let _lock = FILE_LOCK.lock();
    write_unlocked(path, data)
}

pub fn initialize_json_file<T: Serialize>(path: &Path, default: &T) -> Result<(), String> {
    if !path.exists() {
        log::info!("Initializing JSON file: {:?}", path);
        write_json_file(path, default)?;
    }
    Ok(())
}

pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
    let _lock = FILE_LOCK.lock();

    if path.exists() {
        read_unlocked(path)
    } else {
        Ok(T::default())
    }
}

/// Read-modify-write under a single lock acquisition. A missing file starts
/// from `T::default()`. Nothing is written when the closure fails.
pub fn update_json_file<T, R, E, F>(path: &Path, update_fn: F) -> Result<R, E>
where
    T: DeserializeOwned + Serialize + Default,
    E: From<String>,
    F: FnOnce(&mut T) -> Result<R, E>,
{
    let _lock = FILE_LOCK.lock();

    let mut data: T = if path.exists() {
        read_unlocked(path)?
    } else {
        T::default()
    };
    let outcome = update_fn(&mut data)?;
    write_unlocked(path, &data)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("jobs.json");

        write_json_file(&path, &vec![1u32, 2, 3]).unwrap();
        let back: Vec<u32> = read_json_file(&path).unwrap();

        assert_eq!(back, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_update_aborts_without_writing_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        write_json_file(&path, &vec![1u32]).unwrap();

        let result: Result<(), String> =
            update_json_file(&path, |items: &mut Vec<u32>| {
                items.push(2);
                Err("rejected".to_string())
            });

        assert_eq!(result.unwrap_err(), "rejected");
        let back: Vec<u32> = read_json_file(&path).unwrap();
        assert_eq!(back, vec![1]);
    }

    #[test]
    fn test_missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<u32> = read_json_file_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(items.is_empty());
        assert!(read_json_file::<Vec<u32>>(&dir.path().join("absent.json")).is_err());
    }
}
