//! 対話式タグ付け
//!
//! タグ付け待ちのスクリーンショットを1枚ずつ表示し、
//! カテゴリとUI要素タグを入力させる。1枚ごとに状態を保存する。

use crate::error::Result;
use appshots_common::{
    CategoryRef, ElementRef, SessionStore, TagOutcome, TagSubStep, UploadFlow, SCREEN_CATEGORIES,
};
use dialoguer::{Input, Select};

const STEP_TAGGING: u8 = 4;

/// 対話アクション
pub enum TagAction {
    /// タグを付ける
    Tag(Vec<ElementRef>),
    /// 保存して終了
    Quit,
}

/// 入力行を解釈
pub fn parse_tag_input(line: &str) -> TagAction {
    if line.trim() == "q" {
        TagAction::Quit
    } else {
        TagAction::Tag(ElementRef::parse_list(line))
    }
}

fn choose_category() -> Result<CategoryRef> {
    let mut items: Vec<&str> = SCREEN_CATEGORIES.to_vec();
    items.push("(その他を入力)");

    let selected = Select::new()
        .with_prompt("カテゴリ")
        .items(&items)
        .default(0)
        .interact()?;

    if selected < SCREEN_CATEGORIES.len() {
        return Ok(CategoryRef::new(SCREEN_CATEGORIES[selected]));
    }
    let custom: String = Input::new().with_prompt("カテゴリ名").interact_text()?;
    Ok(CategoryRef::new(custom.trim().to_lowercase()))
}

/// 対話式でタグ付け
///
/// 全件タグ付けしたら true、途中で終了したら false。
pub fn run_interactive_tagging<S, F>(flow: &mut UploadFlow<S>, now_ms: F) -> Result<bool>
where
    S: SessionStore,
    F: Fn() -> u64,
{
    let total = flow.state().screenshots().len();
    println!("🏷  タグ付け待ち: {}枚", total.saturating_sub(flow.state().active_index()));
    println!("操作: UI要素をカンマ区切りで入力 (例: nav-bar, button) [q]保存して終了");
    println!("---\n");

    while flow.state().step() == STEP_TAGGING {
        let index = flow.state().active_index();
        let Some(shot) = flow.state().active_screenshot() else {
            break;
        };
        let category = shot.category.as_ref().map(|c| c.as_str().to_string());
        println!("[{}/{}] {} ({} bytes)", index + 1, total, shot.file_name, shot.size);
        if let Some(category) = &category {
            println!("  カテゴリ: {}", category);
        }

        if flow.state().tag_sub_step() == TagSubStep::Category || category.is_none() {
            let chosen = choose_category()?;
            flow.choose_category(chosen, now_ms())?;
        }

        let line: String = Input::new()
            .with_prompt("UI要素")
            .allow_empty(true)
            .interact_text()?;

        match parse_tag_input(&line) {
            TagAction::Quit => return Ok(false),
            TagAction::Tag(elements) if elements.is_empty() => {
                println!("  ⚠ UI要素を1つ以上入力してください");
            }
            TagAction::Tag(elements) => match flow.tag_current(elements, now_ms())? {
                TagOutcome::Next(_) => println!(),
                TagOutcome::Completed => {
                    println!("\n✔ すべてのスクリーンショットにタグを付けました");
                    return Ok(true);
                }
            },
        }
    }

    Ok(flow.ready_to_submit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(action: TagAction) -> Vec<String> {
        match action {
            TagAction::Tag(e) => e.into_iter().map(|e| e.as_str().to_string()).collect(),
            TagAction::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_parse_tag_input() {
        assert_eq!(elements(parse_tag_input(" Nav-Bar, button ,,button")), vec!["nav-bar", "button"]);
        assert!(elements(parse_tag_input("   ")).is_empty());
        assert!(matches!(parse_tag_input("q"), TagAction::Quit));
    }
}
