use std::{io::ErrorKind, path::Path};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt};

use super::error::{Result, StoreError, StoreOp};

/// Read and parse a JSON file. A missing file is `Ok(None)`; anything else
/// that goes wrong is an error, including unparseable content.
pub(crate) async fn read_json<T: DeserializeOwned>(op: StoreOp, path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                op,
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Malformed {
            op,
            path: path.to_path_buf(),
            source: e,
        })
}

/// Replace `path` with the pretty-printed JSON of `value`.
///
/// The content goes to `<path>.tmp` first and is renamed over the target once
/// synced, so readers see either the old file or the new one. Parent
/// directories are created as needed.
pub(crate) async fn write_json_atomic<T: Serialize>(op: StoreOp, path: &Path, value: &T) -> Result<()> {
    let io_err = |p: &Path, e: std::io::Error| StoreError::Io {
        op,
        path: p.to_path_buf(),
        source: e,
    };

    let mut body = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Encode {
        op,
        path: path.to_path_buf(),
        source: e,
    })?;
    body.push(b'\n');

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| io_err(parent, e))?;
    }

    let tmp = tmp_path(path);
    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let got: Option<Value> = read_json(StoreOp::LoadMonthly, &dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{\"device_id\": ").unwrap();

        let err = read_json::<Value>(StoreOp::LoadDaily, &path).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { op: StoreOp::LoadDaily, .. }));
        assert!(err.to_string().contains("bad.json"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev").join("daily").join("2024-06.json");

        write_json_atomic(StoreOp::SaveDaily, &path, &json!({"a": 1})).await.unwrap();
        write_json_atomic(StoreOp::SaveDaily, &path, &json!({"a": 2})).await.unwrap();

        let got: Value = read_json(StoreOp::LoadDaily, &path).await.unwrap().unwrap();
        assert_eq!(got, json!({"a": 2}));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn temp_file_sits_next_to_target() {
        let p = Path::new("/data/dev/2024-06.json");
        assert_eq!(tmp_path(p), Path::new("/data/dev/2024-06.json.tmp"));
    }
}
