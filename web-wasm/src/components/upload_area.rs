//! アップロードエリアコンポーネント
//!
//! 選択・ドロップされたファイルをData URLとして読み込み、
//! すべて読み終えてから1つのバッチとして渡す。

use appshots_common::codec::{extract_mime_type_from_data_url, DataUrlCodec, Payload, PayloadCodec};
use appshots_common::RawFile;
use leptos::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use web_sys::{DragEvent, File, FileList, FileReader};

#[component]
pub fn UploadArea<F>(enabled: Signal<bool>, on_files: F) -> impl IntoView
where
    F: Fn(Vec<RawFile>) + 'static + Clone,
{
    let (is_dragover, set_is_dragover) = signal(false);

    let handle_files = {
        let on_files = on_files.clone();
        move |files: FileList| read_batch(files, on_files.clone())
    };

    let on_drop = {
        let handle_files = handle_files.clone();
        move |ev: DragEvent| {
            ev.prevent_default();
            set_is_dragover.set(false);

            if !enabled.get_untracked() {
                return;
            }
            if let Some(files) = ev.data_transfer().and_then(|dt| dt.files()) {
                handle_files(files);
            }
        }
    };

    let on_dragover = move |ev: DragEvent| {
        ev.prevent_default();
        if enabled.get_untracked() {
            set_is_dragover.set(true);
        }
    };

    let on_dragleave = move |_: DragEvent| {
        set_is_dragover.set(false);
    };

    let on_click = move |_| {
        if !enabled.get_untracked() {
            return;
        }
        let Some(input) = create_file_input() else {
            log::warn!("cannot open the file dialog");
            return;
        };

        let handle_files = handle_files.clone();
        let input_clone = input.clone();
        let closure = Closure::wrap(Box::new(move |_: web_sys::Event| {
            if let Some(files) = input_clone.files() {
                handle_files(files);
            }
        }) as Box<dyn FnMut(_)>);

        input.set_onchange(Some(closure.as_ref().unchecked_ref()));
        closure.forget();
        input.click();
    };

    view! {
        <div
            class=move || {
                let mut classes = vec!["upload-area"];
                if is_dragover.get() {
                    classes.push("dragover");
                }
                if !enabled.get() {
                    classes.push("disabled");
                }
                classes.join(" ")
            }
            on:drop=on_drop
            on:dragover=on_dragover
            on:dragleave=on_dragleave
            on:click=on_click
        >
            <Show
                when=move || enabled.get()
                fallback=|| view! {
                    <div class="upload-icon">"🏷"</div>
                    <p>"先にカテゴリを選んでください"</p>
                }
            >
                <div class="upload-icon">"📱"</div>
                <p>"スクリーンショットをドラッグ&ドロップ または クリックして選択"</p>
                <p class="text-muted">"画像以外のファイルはスキップされます"</p>
            </Show>
        </div>
    }
}

fn create_file_input() -> Option<web_sys::HtmlInputElement> {
    let document = web_sys::window()?.document()?;
    let input: web_sys::HtmlInputElement = document.create_element("input").ok()?.dyn_into().ok()?;
    input.set_type("file");
    input.set_accept("image/*");
    input.set_multiple(true);
    Some(input)
}

/// 読み込み途中のバッチ（入力順を保持）
struct PendingBatch {
    slots: Vec<Option<RawFile>>,
    finished: Vec<bool>,
    remaining: usize,
}

impl PendingBatch {
    fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
            finished: vec![false; count],
            remaining: count,
        }
    }

    /// 1件分の完了を記録し、全件そろったらバッチを返す
    ///
    /// 同じ枠の2回目の完了は無視する。
    fn complete(&mut self, index: usize, file: Option<RawFile>) -> Option<Vec<RawFile>> {
        if self.finished.get(index).copied().unwrap_or(true) {
            return None;
        }
        self.finished[index] = true;
        self.slots[index] = file;
        self.remaining -= 1;
        if self.remaining == 0 {
            Some(self.slots.drain(..).flatten().collect())
        } else {
            None
        }
    }
}

fn read_batch<F>(files: FileList, on_files: F)
where
    F: Fn(Vec<RawFile>) + 'static,
{
    let count = files.length() as usize;
    if count == 0 {
        return;
    }

    let batch = Rc::new(RefCell::new(PendingBatch::new(count)));
    let on_files = Rc::new(on_files);

    for i in 0..count {
        let Some(file) = files.get(i as u32) else {
            finish_slot(&batch, &on_files, i, None);
            continue;
        };
        read_file(file, i, batch.clone(), on_files.clone());
    }
}

fn finish_slot<F>(batch: &Rc<RefCell<PendingBatch>>, on_files: &Rc<F>, index: usize, file: Option<RawFile>)
where
    F: Fn(Vec<RawFile>) + 'static,
{
    let files = batch.borrow_mut().complete(index, file);
    if let Some(files) = files {
        on_files(files);
    }
}

fn read_file<F>(file: File, index: usize, batch: Rc<RefCell<PendingBatch>>, on_files: Rc<F>)
where
    F: Fn(Vec<RawFile>) + 'static,
{
    let file_name = file.name();
    let Ok(reader) = FileReader::new() else {
        finish_slot(&batch, &on_files, index, None);
        return;
    };

    let reader_clone = reader.clone();
    let (error_batch, error_on_files) = (batch.clone(), on_files.clone());
    let (failed_batch, failed_on_files) = (batch.clone(), on_files.clone());
    let failed_name = file_name.clone();
    let onerror = Closure::once(move |_: web_sys::ProgressEvent| {
        log::warn!("failed to read {}", failed_name);
        finish_slot(&failed_batch, &failed_on_files, index, None);
    });
    let onload = Closure::once(move |_: web_sys::ProgressEvent| {
        let raw = reader_clone
            .result()
            .ok()
            .and_then(|result| result.as_string())
            .map(|data_url| {
                let mime_type = extract_mime_type_from_data_url(&data_url).to_string();
                let bytes = match DataUrlCodec.decode(&data_url) {
                    Payload::Bytes(bytes) => bytes,
                    Payload::Missing => Vec::new(),
                };
                RawFile::new(file_name.clone(), mime_type, bytes)
            })
            // 読めなかったファイルは画像以外として数える
            .unwrap_or_else(|| RawFile::new(file_name, "application/octet-stream", Vec::new()));
        finish_slot(&batch, &on_files, index, Some(raw));
    });

    reader.set_onload(Some(onload.as_ref().unchecked_ref()));
    onload.forget();
    reader.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onerror.forget();

    if let Err(e) = reader.read_as_data_url(&file) {
        log::warn!("failed to read {}: {:?}", file.name(), e);
        finish_slot(&error_batch, &error_on_files, index, None);
    }
}
