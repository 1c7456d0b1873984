//! ローカル実行用の外部サービス実装
//!
//! ホスティング先のAPIの代わりに、データディレクトリ配下へ保存する。

mod resolver;
mod storage;

pub use resolver::{DiskCachedResolver, LocalResolver, MetadataCache};
pub use storage::{JsonlRecordStore, LocalObjectStore};
