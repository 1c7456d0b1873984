use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "appshots")]
#[command(about = "アプリのスクリーンショット投稿ウィザード", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 表示中のルート（アップロード画面以外を指定すると作業を破棄することがある）
    #[arg(long, global = true)]
    pub route: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Step 1: ストアリンクを送信
    Link {
        /// App Store / Google Play のURL
        #[arg(required = true)]
        url: String,
    },

    /// Step 2: アプリ情報を確認して確定
    Confirm {
        /// アプリ名を上書き
        #[arg(long)]
        name: Option<String>,

        /// 開発元を上書き
        #[arg(long)]
        publisher: Option<String>,

        /// 代表画像のURL（複数可、合計3件まで）
        #[arg(long = "hero-image")]
        hero_images: Vec<String>,

        /// 代表動画のURL（複数可）
        #[arg(long = "hero-video")]
        hero_videos: Vec<String>,
    },

    /// Step 3: スクリーンショットを追加
    Upload {
        /// 画像ファイルまたはフォルダ
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// このバッチのカテゴリ
        #[arg(short, long)]
        category: Option<String>,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// Step 4: 現在のスクリーンショットにタグを付ける（省略時は対話式）
    Tag {
        /// カテゴリ
        #[arg(short, long)]
        category: Option<String>,

        /// UI要素（カンマ区切り）
        #[arg(short, long)]
        elements: Option<String>,
    },

    /// 1つ前のステップへ戻る
    Back,

    /// 現在の状態を表示
    Status,

    /// Step 5: 送信
    Submit,

    /// 作業を破棄
    Cancel,

    /// セッション管理
    Session {
        /// セッション情報を表示
        #[arg(long)]
        info: bool,

        /// セッションとメタデータキャッシュを削除
        #[arg(long)]
        clear: bool,
    },

    /// 設定を表示/編集
    Config {
        /// サインインする利用者ID
        #[arg(long)]
        set_viewer: Option<String>,

        /// アップロード権限 (true/false)
        #[arg(long)]
        can_upload: Option<bool>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
