//! 投稿する画像ファイルの収集
//!
//! MIMEタイプは拡張子ではなく先頭バイトから判定する。
//! 画像でないファイルも `RawFile` として返し、取り込み時にスキップ件数として数える。

use crate::error::{AppshotsError, Result};
use appshots_common::RawFile;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const OCTET_STREAM: &str = "application/octet-stream";

/// フォルダ内のファイルを列挙（ファイル名順）
pub fn scan_folder(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(AppshotsError::FolderNotFound(folder.display().to_string()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .collect();

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// 引数のパス（ファイル/フォルダ混在）を展開
pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            paths.extend(scan_folder(input, recursive)?);
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            return Err(AppshotsError::FileNotFound(input.display().to_string()));
        }
    }
    Ok(paths)
}

/// 先頭バイトからMIMEタイプを判定
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(OCTET_STREAM)
}

/// ファイルを並列に読み込む（入力順を保持）
pub fn read_files(paths: &[PathBuf]) -> Result<Vec<RawFile>> {
    paths
        .par_iter()
        .map(|path| -> Result<RawFile> {
            let bytes = std::fs::read(path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let mime_type = sniff_mime_type(&bytes);
            log::debug!("read {} ({} bytes, {})", name, bytes.len(), mime_type);
            Ok(RawFile::new(name, mime_type, bytes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_HEADER: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    #[test]
    fn test_sniff_mime_type() {
        assert_eq!(sniff_mime_type(PNG_HEADER), "image/png");
        assert_eq!(sniff_mime_type(JPEG_HEADER), "image/jpeg");
        assert_eq!(sniff_mime_type(b"hello"), OCTET_STREAM);
        assert_eq!(sniff_mime_type(b""), OCTET_STREAM);
    }

    #[test]
    fn test_scan_folder_sorted_and_skips_hidden() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("c.png"), PNG_HEADER).unwrap();
        fs::write(dir.path().join("a.png"), PNG_HEADER).unwrap();
        fs::write(dir.path().join(".metadata-cache.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.png"), PNG_HEADER).unwrap();

        let flat = scan_folder(dir.path(), false).unwrap();
        let names: Vec<String> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "c.png"]);

        let deep = scan_folder(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_read_files_keeps_order() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("shot.png");
        let txt = dir.path().join("notes.txt");
        fs::write(&png, PNG_HEADER).unwrap();
        fs::write(&txt, "text").unwrap();

        let files = read_files(&[png, txt]).unwrap();
        assert_eq!(files[0].name, "shot.png");
        assert!(files[0].is_image());
        assert_eq!(files[1].name, "notes.txt");
        assert!(!files[1].is_image());
    }

    #[test]
    fn test_collect_inputs_missing_path() {
        let err = collect_inputs(&[PathBuf::from("/nonexistent/a.png")], false).unwrap_err();
        assert!(matches!(err, AppshotsError::FileNotFound(_)));
    }
}
