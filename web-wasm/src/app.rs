//! アップロード画面
//!
//! フロー本体は `UploadFlow` が持ち、画面は操作のたびに状態の写しを
//! シグナルへ流して再描画する。表示状態の変化はタイマー経由で `poll` する。

use crate::api::{self, HttpBackend};
use crate::components::{step_indicator::StepIndicator, upload_area::UploadArea};
use crate::storage::WebSessionStore;
use appshots_common::{
    AppRecord, CachedResolver, CategoryRef, ElementRef, FlowConfig, GateDecision,
    MetadataResolver, RawFile, RedirectTarget, Resolution, TagSubStep, UploadFlow, Visibility,
    VisibilityAction, WizardState, DEFAULT_UPLOAD_ROUTE, SCREEN_CATEGORIES,
};
use gloo::events::EventListener;
use gloo::timers::callback::Timeout;
use leptos::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

type Flow = UploadFlow<WebSessionStore>;

/// 処理中にタイマーが来たときの再試行間隔
const BUSY_RETRY_MS: u32 = 100;

fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

fn current_route() -> String {
    web_sys::window()
        .and_then(|w| w.location().pathname().ok())
        .unwrap_or_else(|| DEFAULT_UPLOAD_ROUTE.to_string())
}

fn redirect(target: RedirectTarget) {
    let href = match target {
        RedirectTarget::SignIn => "/sign-in?redirect=/upload",
        RedirectTarget::Upgrade => "/pricing",
    };
    if let Some(window) = web_sys::window() {
        if let Err(e) = window.location().set_href(href) {
            log::error!("redirect failed: {:?}", e);
        }
    }
}

/// フローへのハンドル（Copy、イベントハンドラへそのまま渡せる）
#[derive(Clone, Copy)]
struct FlowHandle {
    flow: StoredValue<Rc<RefCell<Flow>>, LocalStorage>,
    resolver: StoredValue<Rc<CachedResolver<HttpBackend>>, LocalStorage>,
    state: RwSignal<WizardState>,
    error: RwSignal<Option<String>>,
}

impl FlowHandle {
    fn new(flow: Flow) -> Self {
        let state = RwSignal::new(flow.state().clone());
        Self {
            flow: StoredValue::new_local(Rc::new(RefCell::new(flow))),
            resolver: StoredValue::new_local(Rc::new(CachedResolver::new(HttpBackend))),
            state,
            error: RwSignal::new(None),
        }
    }

    /// フローに触る（送信中で借用できなければ None）
    fn with<T>(&self, f: impl FnOnce(&mut Flow) -> T) -> Option<T> {
        let flow = self.flow.get_value();
        let Ok(mut flow) = flow.try_borrow_mut() else {
            log::debug!("flow is busy");
            return None;
        };
        let value = f(&mut flow);
        self.state.set(flow.state().clone());
        Some(value)
    }

    /// ウィザード操作（エラーは画面に出す）
    fn apply<T>(&self, op: impl FnOnce(&mut Flow, u64) -> appshots_common::Result<T>) -> Option<T> {
        match self.with(|flow| op(flow, now_ms()))? {
            Ok(value) => {
                self.error.set(None);
                Some(value)
            }
            Err(e) => {
                if !e.is_validation() {
                    log::warn!("{}", e);
                }
                self.error.set(Some(e.to_string()));
                None
            }
        }
    }
}

/// 次の期限に `poll` を予約する
fn schedule_poll(handle: FlowHandle) {
    let delay = match handle.with(|flow| flow.next_deadline()) {
        Some(None) => return,
        Some(Some(at)) => at.saturating_sub(now_ms()) as u32,
        None => BUSY_RETRY_MS,
    };
    Timeout::new(delay, move || {
        if let Some(due) = handle.with(|flow| flow.poll(now_ms())) {
            if !due.is_empty() {
                log::debug!("lifecycle due: {:?}", due);
            }
        }
        schedule_poll(handle);
    })
    .forget();
}

fn watch_visibility(handle: FlowHandle) {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let doc = document.clone();
    EventListener::new(&document, "visibilitychange", move |_| {
        let visibility = if doc.hidden() { Visibility::Hidden } else { Visibility::Visible };
        let action = handle.with(|flow| flow.on_visibility(visibility, now_ms()));
        if let Some(VisibilityAction::RestoreScheduled { .. }) = action {
            schedule_poll(handle);
        }
    })
    .forget();
}

/// ログイン状態を取得してからアクセス判定
fn check_access(handle: FlowHandle) {
    wasm_bindgen_futures::spawn_local(async move {
        let (viewer, level) = match api::fetch_viewer().await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("viewer lookup failed: {}", e);
                return;
            }
        };
        let decision = handle.with(|flow| {
            flow.check_access(&Resolution::Ready(viewer), &Resolution::Ready(level))
        });
        match decision {
            Some(GateDecision::Redirect(target)) => redirect(target),
            Some(other) => log::debug!("access: {:?}", other),
            None => {}
        }
    });
}

fn resolve_metadata(handle: FlowHandle, resolved: RwSignal<Option<AppRecord>>) {
    let Some(link) = handle.state.with_untracked(|s| s.source_link().cloned()) else {
        return;
    };
    let resolver = handle.resolver.get_value();
    wasm_bindgen_futures::spawn_local(async move {
        match resolver.resolve(&link).await {
            Ok(record) => resolved.set(Some(record)),
            Err(e) => handle.error.set(Some(e.to_string())),
        }
    });
}

#[component]
pub fn App() -> impl IntoView {
    let mut flow = UploadFlow::new(WebSessionStore::new(), FlowConfig::default());
    let restored = flow.mount(&current_route(), now_ms());
    let handle = FlowHandle::new(flow);
    if restored {
        log::info!("upload restored");
    }

    watch_visibility(handle);
    check_access(handle);
    on_cleanup(move || {
        handle.with(|flow| flow.unmount());
    });

    let step = Signal::derive(move || handle.state.with(|s| s.step()));
    let resolved = RwSignal::new(handle.state.with_untracked(|s| s.app_record().cloned()));

    view! {
        <div class="container">
            <h1>"スクリーンショットを投稿"</h1>
            <StepIndicator step=step />

            <Show when=move || handle.error.get().is_some()>
                <p class="error">{move || handle.error.get().unwrap_or_default()}</p>
            </Show>

            {move || match step.get() {
                1 => view! { <LinkStep handle=handle resolved=resolved /> }.into_any(),
                2 => view! { <MetadataStep handle=handle resolved=resolved /> }.into_any(),
                3 => view! { <UploadStep handle=handle /> }.into_any(),
                4 => view! { <TagStep handle=handle /> }.into_any(),
                _ => view! { <ReviewStep handle=handle /> }.into_any(),
            }}

            <div class="actions">
                <button
                    disabled=move || step.get() <= 1
                    on:click=move |_| {
                        handle.with(|flow| flow.go_back(now_ms()));
                    }
                >
                    "戻る"
                </button>
                <button
                    class="secondary"
                    on:click=move |_| {
                        handle.with(|flow| flow.cancel());
                        resolved.set(None);
                    }
                >
                    "キャンセル"
                </button>
            </div>
        </div>
    }
}

#[component]
fn LinkStep(handle: FlowHandle, resolved: RwSignal<Option<AppRecord>>) -> impl IntoView {
    let url = RwSignal::new(
        handle
            .state
            .with_untracked(|s| s.source_link().map(|l| l.url.clone()))
            .unwrap_or_default(),
    );

    let on_submit = move |_| {
        if handle.apply(|flow, now| flow.submit_link(&url.get_untracked(), now)).is_some() {
            resolve_metadata(handle, resolved);
        }
    };

    view! {
        <section class="step">
            <label>"App Store / Google Play のリンク"</label>
            <input
                type="url"
                placeholder="https://apps.apple.com/..."
                prop:value=move || url.get()
                on:input=move |ev| url.set(event_target_value(&ev))
            />
            <button on:click=on_submit>"次へ"</button>
        </section>
    }
}

#[component]
fn MetadataStep(handle: FlowHandle, resolved: RwSignal<Option<AppRecord>>) -> impl IntoView {
    if resolved.get_untracked().is_none() {
        resolve_metadata(handle, resolved);
    }
    let name = RwSignal::new(String::new());
    let heroes = RwSignal::new(String::new());

    let on_confirm = move |_| {
        let Some(mut record) = resolved.get_untracked() else {
            return;
        };
        let edited = name.get_untracked();
        if !edited.trim().is_empty() {
            record.name = edited.trim().to_string();
        }
        let hero_images: Vec<String> = heroes
            .get_untracked()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        handle.apply(|flow, now| flow.confirm_metadata(record, &hero_images, &[], now));
    };

    view! {
        <section class="step">
            <Show
                when=move || resolved.get().is_some()
                fallback=|| view! { <p class="text-muted">"アプリ情報を取得中..."</p> }
            >
                <p>
                    {move || resolved.get().map(|r| format!("{} ({})", r.name, r.app_id)).unwrap_or_default()}
                </p>
            </Show>
            <label>"アプリ名（変更する場合）"</label>
            <input prop:value=move || name.get() on:input=move |ev| name.set(event_target_value(&ev)) />
            <label>"代表画像のURL（空白区切り、3件まで）"</label>
            <input prop:value=move || heroes.get() on:input=move |ev| heroes.set(event_target_value(&ev)) />
            <button disabled=move || resolved.get().is_none() on:click=on_confirm>
                "確定"
            </button>
        </section>
    }
}

#[component]
fn CategorySelect<F>(selected: Signal<Option<String>>, on_select: F) -> impl IntoView
where
    F: Fn(CategoryRef) + 'static,
{
    view! {
        <select on:change=move |ev| {
            let value = event_target_value(&ev);
            if !value.is_empty() {
                on_select(CategoryRef::new(value));
            }
        }>
            <option value="" selected=move || selected.get().is_none()>"カテゴリを選択"</option>
            {SCREEN_CATEGORIES
                .iter()
                .map(|c| {
                    let value = c.to_string();
                    let is_selected = move || selected.get().as_deref() == Some(*c);
                    view! { <option value=value selected=is_selected>{*c}</option> }
                })
                .collect_view()}
        </select>
    }
}

#[component]
fn UploadStep(handle: FlowHandle) -> impl IntoView {
    let notice = RwSignal::new(None::<String>);
    let selected = Signal::derive(move || {
        handle
            .state
            .with(|s| s.pending_category().map(|c| c.as_str().to_string()))
    });
    let enabled = Signal::derive(move || selected.get().is_some());

    let on_files = move |files: Vec<RawFile>| {
        if let Some(outcome) = handle.apply(|flow, now| flow.upload_batch(files, now)) {
            if !outcome.skipped.is_empty() {
                notice.set(Some(format!("{}件は画像ではないためスキップしました", outcome.skipped.len())));
            }
        }
    };

    view! {
        <section class="step">
            <CategorySelect
                selected=selected
                on_select=move |category| {
                    handle.apply(|flow, now| flow.select_category(category, now));
                }
            />
            <UploadArea enabled=enabled on_files=on_files />
            <p class="text-muted">{move || notice.get().unwrap_or_default()}</p>
        </section>
    }
}

#[component]
fn TagStep(handle: FlowHandle) -> impl IntoView {
    let elements = RwSignal::new(String::new());
    let active = move || handle.state.with(|s| s.active_screenshot().cloned());
    let needs_category = move || handle.state.with(|s| s.tag_sub_step() == TagSubStep::Category);
    let category = Signal::derive(move || {
        active().and_then(|shot| shot.category.map(|c| c.as_str().to_string()))
    });

    let on_tag = move |_| {
        let parsed: Vec<ElementRef> = ElementRef::parse_list(&elements.get_untracked());
        if handle.apply(|flow, now| flow.tag_current(parsed, now)).is_some() {
            elements.set(String::new());
        }
    };

    view! {
        <section class="step">
            <p>
                {move || handle.state.with(|s| format!(
                    "{}/{}枚目",
                    s.active_index() + 1,
                    s.screenshots().len()
                ))}
            </p>
            <img class="preview" src=move || active().map(|shot| shot.preview).unwrap_or_default() />
            <Show when=needs_category>
                <CategorySelect
                    selected=category
                    on_select=move |category| {
                        handle.apply(|flow, now| flow.choose_category(category, now));
                    }
                />
            </Show>
            <Show when=move || !needs_category()>
                <label>"UI要素（カンマ区切り）"</label>
                <input
                    placeholder="nav-bar, button"
                    prop:value=move || elements.get()
                    on:input=move |ev| elements.set(event_target_value(&ev))
                />
                <button on:click=on_tag>"タグを付ける"</button>
            </Show>
        </section>
    }
}

#[component]
fn ReviewStep(handle: FlowHandle) -> impl IntoView {
    let submitting = RwSignal::new(false);
    let progress = RwSignal::new((0usize, 0usize));
    let done = RwSignal::new(None::<String>);

    let on_submit = move |_| {
        submitting.set(true);
        let flow = handle.flow.get_value();
        wasm_bindgen_futures::spawn_local(async move {
            // 送信中は借用したままにし、他の操作は try_borrow_mut で弾く
            #[allow(clippy::await_holding_refcell_ref)]
            let result = match flow.try_borrow_mut() {
                Ok(mut flow) => {
                    let result = flow
                        .submit(&HttpBackend, &HttpBackend, |n, total| progress.set((n, total)))
                        .await;
                    handle.state.set(flow.state().clone());
                    Some(result)
                }
                Err(_) => None,
            };
            submitting.set(false);
            match result {
                Some(Ok(report)) => done.set(Some(format!("{}件を登録しました", report.inserted))),
                Some(Err(e)) => handle.error.set(Some(e.to_string())),
                None => log::debug!("submit skipped: flow is busy"),
            }
        });
    };

    view! {
        <section class="step">
            <ul class="review">
                {move || handle.state.with(|s| {
                    s.screenshots()
                        .iter()
                        .map(|shot| {
                            let category = shot.category.as_ref().map(|c| c.as_str().to_string()).unwrap_or_default();
                            let elements: Vec<&str> = shot.elements.iter().map(|e| e.as_str()).collect();
                            let line = format!("{} [{}] {}", shot.file_name, category, elements.join(", "));
                            view! { <li>{line}</li> }
                        })
                        .collect_view()
                })}
            </ul>
            <Show when=move || submitting.get()>
                <p class="progress-text">
                    {move || {
                        let (n, total) = progress.get();
                        format!("送信中... {}/{}", n, total)
                    }}
                </p>
            </Show>
            <p class="success">{move || done.get().unwrap_or_default()}</p>
            <button disabled=move || submitting.get() on:click=on_submit>"送信"</button>
        </section>
    }
}
