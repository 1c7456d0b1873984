use appshots::app::{now_ms, App};
use appshots::cli::{Cli, Commands};
use appshots::config::Config;
use appshots::error::{AppshotsError, Result};
use appshots::local::MetadataCache;
use appshots::session_file::FileSessionStore;
use appshots::{interactive, scanner};
use appshots_common::{
    CategoryRef, Error as CommonError, MetadataResolver, SessionStore, TagOutcome, WizardState,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};

fn init_logging(verbose: bool) {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    if TermLogger::init(
        log_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .is_err()
    {
        eprintln!("ロガーの初期化に失敗しました");
    }
}

fn step_label(step: u8) -> &'static str {
    match step {
        1 => "ストアリンク入力",
        2 => "アプリ情報確認",
        3 => "スクリーンショット追加",
        4 => "タグ付け",
        _ => "送信確認",
    }
}

fn print_status(state: &WizardState) {
    println!("ステップ: {}/5 {}", state.step(), step_label(state.step()));
    if let Some(link) = state.source_link() {
        println!("  リンク: {}", link.url);
    }
    if let Some(app) = state.app_record() {
        println!("  アプリ: {} ({}, {})", app.name, app.app_id, app.platform.as_str());
    }
    if let Some(hero) = state.hero_selection() {
        println!("  代表メディア: {}件", hero.len());
    }
    if let Some(category) = state.pending_category() {
        println!("  次のカテゴリ: {}", category.as_str());
    }

    let shots = state.screenshots();
    if !shots.is_empty() {
        let tagged = shots.iter().filter(|s| s.is_tagged()).count();
        println!("  スクリーンショット: {}枚（タグ付け済み {}枚）", shots.len(), tagged);
        for (i, shot) in shots.iter().enumerate() {
            let marker = if state.step() == 4 && i == state.active_index() { "▶" } else { " " };
            let category = shot.category.as_ref().map(|c| c.as_str()).unwrap_or("-");
            let elements: Vec<&str> = shot.elements.iter().map(|e| e.as_str()).collect();
            println!("   {} {} [{}] {}", marker, shot.file_name, category, elements.join(", "));
        }
    }

    if let Some(saved_at) = state.saved_at() {
        if let Some(at) = chrono::DateTime::from_timestamp_millis(saved_at as i64) {
            let local = at.with_timezone(&chrono::Local);
            println!("  最終保存: {}", local.format("%Y-%m-%d %H:%M:%S"));
        }
    }
}

async fn run_command(app: &mut App, command: Commands) -> Result<()> {
    match command {
        Commands::Link { url } => {
            let link = app.flow.submit_link(&url, now_ms())?;
            println!("✔ リンクを受け付けました: {:?} {}", link.store, link.app_id);

            let record = app.resolver().resolve(&link).await?;
            println!("  アプリ名: {}", record.name);
            if !record.publisher.is_empty() {
                println!("  開発元: {}", record.publisher);
            }
            println!("\n次: appshots confirm");
        }

        Commands::Confirm { name, publisher, hero_images, hero_videos } => {
            let state = app.flow.state();
            let link = state.source_link().cloned().ok_or(CommonError::WrongStep {
                expected: 2,
                actual: state.step(),
            })?;

            let mut record = app.resolver().resolve(&link).await?;
            if let Some(name) = name {
                record.name = name;
            }
            if let Some(publisher) = publisher {
                record.publisher = publisher;
            }

            app.flow.confirm_metadata(record, &hero_images, &hero_videos, now_ms())?;
            println!("✔ アプリ情報を確定しました");
            println!("\n次: appshots upload <画像またはフォルダ> --category <カテゴリ>");
        }

        Commands::Upload { paths, category, recursive } => {
            if let Some(category) = category {
                if app.flow.state().step() == 3 {
                    app.flow.select_category(CategoryRef::new(category), now_ms())?;
                } else {
                    println!("⚠ カテゴリはステップ3でのみ変更できます（現在のカテゴリで追加します）");
                }
            }

            println!("[1/2] ファイルをスキャン中...");
            let inputs = scanner::collect_inputs(&paths, recursive)?;
            let files = scanner::read_files(&inputs)?;
            println!("✔ {}件のファイルを検出\n", files.len());

            println!("[2/2] 取り込み中...");
            let outcome = app.flow.upload_batch(files, now_ms())?;
            println!("✔ {}枚を追加", outcome.added);
            for name in &outcome.skipped {
                println!("  - スキップ（画像ではありません）: {}", name);
            }
            println!("\n次: appshots tag");
        }

        Commands::Tag { category, elements } => match elements {
            Some(line) => {
                let interactive::TagAction::Tag(elements) = interactive::parse_tag_input(&line) else {
                    return Ok(());
                };
                let outcome = match category {
                    Some(category) => app.flow.tag_current_with_category(
                        CategoryRef::new(category),
                        elements,
                        now_ms(),
                    )?,
                    None => app.flow.tag_current(elements, now_ms())?,
                };
                match outcome {
                    TagOutcome::Next(index) => {
                        println!("✔ タグを付けました（次: {}枚目）", index + 1)
                    }
                    TagOutcome::Completed => {
                        println!("✔ すべてのタグ付けが完了しました\n\n次: appshots submit")
                    }
                }
            }
            None => {
                if let Some(category) = category {
                    app.flow.choose_category(CategoryRef::new(category), now_ms())?;
                }
                if interactive::run_interactive_tagging(&mut app.flow, now_ms)? {
                    println!("\n次: appshots submit");
                }
            }
        },

        Commands::Back => {
            let step = app.flow.go_back(now_ms());
            println!("✔ ステップ{}（{}）に戻りました", step, step_label(step));
        }

        Commands::Status => {
            print_status(app.flow.state());
            println!(
                "  作業中フラグ: {}",
                if app.flow.session().upload_in_progress { "あり" } else { "なし" }
            );
            let recent = app.flow.persistence().cached_batch();
            if !recent.is_empty() {
                let names: Vec<&str> = recent.iter().map(|s| s.file_name.as_str()).collect();
                println!("  直近のアップロード: {}", names.join(", "));
            }
        }

        Commands::Submit => {
            println!("🚀 送信中...");
            let objects = app.object_store();
            let records = app.record_store();
            let total = app.flow.state().screenshots().len() as u64;

            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}") {
                pb.set_style(style.progress_chars("=> "));
            }
            let result = app
                .flow
                .submit(&objects, &records, |done, _| pb.set_position(done as u64))
                .await;
            pb.finish_and_clear();

            let report = result?;
            println!("✔ {}件を登録しました", report.inserted);
            if report.reused > 0 {
                println!("  （うち{}件はアップロード済みの画像を再利用）", report.reused);
            }
            println!("  保存先: {}", records.path().display());
            println!("\n✅ 完了");
        }

        Commands::Cancel => {
            app.flow.cancel();
            println!("✔ 作業を破棄しました");
        }

        Commands::Session { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

fn run_session(config: &Config, info: bool, clear: bool) -> Result<()> {
    let data_dir = config.data_dir()?;
    let session_path = FileSessionStore::session_path(&data_dir);

    if info || !clear {
        let store = FileSessionStore::open(&data_dir)?;
        if store.is_empty() {
            println!("セッションは空です: {}", session_path.display());
        } else {
            println!("セッション情報:");
            println!("  パス: {}", session_path.display());
            for key in store.keys() {
                let size = store.get(key)?.map(|v| v.len()).unwrap_or(0);
                println!("  {}: {} bytes", key, size);
            }
        }
        println!("  メタデータキャッシュ: {}件", MetadataCache::load(&data_dir).len());
    }

    if clear {
        match FileSessionStore::delete(&data_dir) {
            Ok(true) => println!("✔ セッションを削除しました: {}", session_path.display()),
            Ok(false) => println!("セッションファイルが存在しません"),
            Err(e) => println!("セッション削除エラー: {}", e),
        }
        if MetadataCache::clear(&data_dir)? {
            println!("✔ メタデータキャッシュを削除しました");
        }
    }
    Ok(())
}

fn run_config(mut config: Config, set_viewer: Option<String>, can_upload: Option<bool>, show: bool) -> Result<()> {
    if let Some(viewer) = set_viewer {
        config.set_viewer(viewer)?;
        println!("✔ 利用者を設定しました");
    }

    if let Some(can_upload) = can_upload {
        config.set_can_upload(can_upload)?;
        println!("✔ アップロード権限を{}にしました", if can_upload { "有効" } else { "無効" });
    }

    if show {
        println!("設定:");
        println!("  利用者: {}", config.viewer.as_deref().unwrap_or("未サインイン"));
        println!("  アップロード権限: {}", if config.can_upload { "あり" } else { "なし" });
        println!("  データ: {}", config.data_dir()?.display());
        println!("  保存間隔: {}ms", config.flow.save_throttle_ms);
        println!("  復元待ち: {}ms", config.flow.lifecycle.restore_delay_ms);
        println!("  フロー: {:?}", config.flow.variant);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Session { info, clear } => return run_session(&config, info, clear),
        Commands::Config { set_viewer, can_upload, show } => {
            return run_config(config, set_viewer, can_upload, show)
        }
        _ => {}
    }

    let mut app = App::open(config, cli.route.as_deref())?;
    let result = match app.authorize() {
        Ok(decision) => {
            log::debug!("access: {:?}", decision);
            run_command(&mut app, cli.command).await
        }
        Err(e) => Err(e),
    };
    app.close();

    if let Err(AppshotsError::Common(e)) = &result {
        if e.is_collaborator() {
            eprintln!("入力内容は保存されています。もう一度実行すると続きから再試行します");
        }
    }
    result
}
