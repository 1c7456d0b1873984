//! ステップ表示コンポーネント

use leptos::prelude::*;

const STEP_LABELS: [&str; 5] = ["リンク", "アプリ情報", "アップロード", "タグ付け", "送信"];

#[component]
pub fn StepIndicator(step: Signal<u8>) -> impl IntoView {
    view! {
        <div class="progress-container">
            <div class="progress-bar">
                <div
                    class="progress-fill"
                    style=move || format!("width: {}%", (step.get().saturating_sub(1) as f32) / 4.0 * 100.0)
                />
            </div>
            <ol class="steps">
                {STEP_LABELS
                    .iter()
                    .enumerate()
                    .map(|(i, label)| {
                        let n = i as u8 + 1;
                        view! {
                            <li class=move || if step.get() == n { "step active" } else if step.get() > n { "step done" } else { "step" }>
                                {*label}
                            </li>
                        }
                    })
                    .collect_view()}
            </ol>
            <p class="progress-text">
                {move || format!("ステップ {}/5", step.get())}
            </p>
        </div>
    }
}
