//! アップロードフロー全体の組み立て
//!
//! ウィザード・永続化・ライフサイクルガード・アクセスゲートを1つにまとめ、
//! 画面側（CLI / Web）からはこの型だけを操作する。

use crate::backend::{ObjectStore, RecordStore};
use crate::codec::{DataUrlCodec, PayloadCodec};
use crate::error::Result;
use crate::gate::{AccessGate, AccessLevel, GateDecision, Resolution, Viewer};
use crate::lifecycle::{Due, LifecycleConfig, LifecycleGuard, Phase, Visibility, VisibilityAction};
use crate::link::StoreLink;
use crate::persistence::{Persistence, SaveOutcome, DEFAULT_THROTTLE_MS};
use crate::session::{FlowSession, SessionStore};
use crate::submit::{submit_screenshots, SubmitReport};
use crate::types::{AppRecord, CategoryRef, ElementRef, FlowVariant, RawFile};
use crate::wizard::{BatchOutcome, TagOutcome, Wizard, WizardState};
use serde::{Deserialize, Serialize};

pub const DEFAULT_UPLOAD_ROUTE: &str = "/upload";

/// フロー設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowConfig {
    pub save_throttle_ms: u64,
    #[serde(flatten)]
    pub lifecycle: LifecycleConfig,
    pub upload_route: String,
    pub variant: FlowVariant,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            save_throttle_ms: DEFAULT_THROTTLE_MS,
            lifecycle: LifecycleConfig::default(),
            upload_route: DEFAULT_UPLOAD_ROUTE.to_string(),
            variant: FlowVariant::default(),
        }
    }
}

/// アップロードフロー
pub struct UploadFlow<S, C = DataUrlCodec> {
    wizard: Wizard<C>,
    persistence: Persistence<S>,
    guard: LifecycleGuard,
    gate: AccessGate,
    config: FlowConfig,
    route: String,
    /// 保存できていない変更がある
    dirty: bool,
}

impl<S: SessionStore> UploadFlow<S> {
    pub fn new(store: S, config: FlowConfig) -> Self {
        Self::with_codec(store, config, DataUrlCodec)
    }
}

impl<S: SessionStore, C: PayloadCodec> UploadFlow<S, C> {
    pub fn with_codec(store: S, config: FlowConfig, codec: C) -> Self {
        Self {
            wizard: Wizard::with_codec(config.variant, codec),
            persistence: Persistence::new(store, config.save_throttle_ms),
            guard: LifecycleGuard::new(config.lifecycle),
            gate: AccessGate::new(),
            route: String::new(),
            config,
            dirty: false,
        }
    }

    pub fn state(&self) -> &WizardState {
        self.wizard.state()
    }

    pub fn session(&self) -> &FlowSession {
        self.wizard.session()
    }

    pub fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn on_upload_route(&self) -> bool {
        self.route == self.config.upload_route
    }

    pub fn ready_to_submit(&self) -> bool {
        self.wizard.ready_to_submit()
    }

    /// マウント（スナップショットがあれば復元）
    ///
    /// 復元した場合は true。
    pub fn mount(&mut self, route: &str, now_ms: u64) -> bool {
        self.guard.mount();
        self.gate.reset();
        self.dirty = false;
        self.route = route.to_string();
        *self.wizard.session_mut() = FlowSession::load(self.persistence.store());
        self.try_restore(now_ms)
    }

    pub fn unmount(&mut self) {
        self.guard.unmount();
        self.gate.reset();
    }

    // ---- ウィザード操作 ----

    pub fn submit_link(&mut self, url: &str, now_ms: u64) -> Result<StoreLink> {
        let before = self.wizard.step();
        let link = self.wizard.submit_link(url)?;
        if self.on_upload_route() {
            self.wizard.session_mut().current_path = Some(self.route.clone());
        }
        self.after_change(before, now_ms);
        Ok(link)
    }

    pub fn confirm_metadata(
        &mut self,
        record: AppRecord,
        hero_images: &[String],
        hero_videos: &[String],
        now_ms: u64,
    ) -> Result<()> {
        let before = self.wizard.step();
        self.wizard.confirm_metadata(record, hero_images, hero_videos)?;
        self.after_change(before, now_ms);
        Ok(())
    }

    pub fn select_category(&mut self, category: CategoryRef, now_ms: u64) -> Result<()> {
        let before = self.wizard.step();
        self.wizard.select_category(category)?;
        self.after_change(before, now_ms);
        Ok(())
    }

    pub fn upload_batch(&mut self, files: Vec<RawFile>, now_ms: u64) -> Result<BatchOutcome> {
        let before = self.wizard.step();
        let outcome = self.wizard.upload_batch(files)?;
        self.after_change(before, now_ms);

        let shots = self.wizard.state().screenshots();
        let batch = &shots[shots.len() - outcome.added..];
        self.persistence.cache_batch(batch);
        Ok(outcome)
    }

    pub fn choose_category(&mut self, category: CategoryRef, now_ms: u64) -> Result<()> {
        let before = self.wizard.step();
        self.wizard.choose_category(category)?;
        self.after_change(before, now_ms);
        Ok(())
    }

    pub fn tag_current(&mut self, elements: Vec<ElementRef>, now_ms: u64) -> Result<TagOutcome> {
        let before = self.wizard.step();
        let outcome = self.wizard.tag_current(elements)?;
        self.after_change(before, now_ms);
        Ok(outcome)
    }

    pub fn tag_current_with_category(
        &mut self,
        category: CategoryRef,
        elements: Vec<ElementRef>,
        now_ms: u64,
    ) -> Result<TagOutcome> {
        let before = self.wizard.step();
        let outcome = self.wizard.tag_current_with_category(category, elements)?;
        self.after_change(before, now_ms);
        Ok(outcome)
    }

    pub fn go_back(&mut self, now_ms: u64) -> u8 {
        let before = self.wizard.step();
        let step = self.wizard.go_back();
        self.after_change(before, now_ms);
        step
    }

    /// 明示的なキャンセル（状態と保存内容を破棄）
    pub fn cancel(&mut self) {
        self.wizard.reset();
        self.wizard.session_mut().clear();
        self.persistence.clear();
        log::info!("upload cancelled");
    }

    // ---- ライフサイクル ----

    pub fn on_visibility(&mut self, visibility: Visibility, now_ms: u64) -> VisibilityAction {
        let on_route = self.on_upload_route();
        let action = self
            .guard
            .on_visibility(visibility, self.wizard.step(), on_route, now_ms);

        match action {
            VisibilityAction::ForceSave => match self.save_with(now_ms, true) {
                SaveOutcome::Written | SaveOutcome::NotNeeded => action,
                outcome => {
                    log::debug!("save on hide did not complete: {:?}", outcome);
                    VisibilityAction::SaveDeferred
                }
            },
            VisibilityAction::RestoreScheduled { .. } => {
                self.wizard.session_mut().tab_switched = true;
                action
            }
            VisibilityAction::SaveDeferred | VisibilityAction::Ignored => action,
        }
    }

    /// 遅延処理を実行（タイマーから呼ぶ）
    pub fn poll(&mut self, now_ms: u64) -> Vec<Due> {
        let due = self.guard.poll(now_ms);
        for item in &due {
            match item {
                Due::Restore => {
                    self.try_restore(now_ms);
                }
                Due::CooldownElapsed => {
                    self.wizard.session_mut().tab_switched = false;
                    if self.dirty {
                        self.save_with(now_ms, true);
                    }
                }
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.guard.next_deadline()
    }

    /// ルート変更
    ///
    /// 作業中マーカーなしでフロー外へ移動したら状態を破棄する。
    pub fn navigate(&mut self, route: &str, now_ms: u64) {
        self.route = route.to_string();
        if self.on_upload_route() {
            if self.wizard.session().upload_in_progress {
                self.wizard.session_mut().current_path = Some(self.route.clone());
                self.persistence.write_session(self.wizard.session());
            }
            return;
        }

        if self.wizard.session().upload_in_progress {
            log::debug!("left the upload route with an upload in progress, keeping it");
            self.save_with(now_ms, true);
        } else {
            self.wizard.reset();
            self.persistence.clear();
        }
    }

    /// アクセス判定（保存・復元と同時には行わない）
    pub fn check_access(
        &mut self,
        identity: &Resolution<Option<Viewer>>,
        level: &Resolution<AccessLevel>,
    ) -> GateDecision {
        if let Err(e) = self.guard.transition(Phase::AuthChecking) {
            log::debug!("access check deferred: {}", e);
            return GateDecision::Pending;
        }
        let decision = self.gate.evaluate(identity, level, self.wizard.session());
        self.finish_phase();
        decision
    }

    /// 送信（成功したらウィザードと保存内容を破棄）
    pub async fn submit<O, R, F>(&mut self, objects: &O, records: &R, on_progress: F) -> Result<SubmitReport>
    where
        O: ObjectStore,
        R: RecordStore,
        F: FnMut(usize, usize),
    {
        let mut uploaded = self.persistence.uploaded();
        let result =
            submit_screenshots(self.wizard.state(), objects, records, &mut uploaded, on_progress).await;

        match result {
            Ok(report) => {
                self.wizard.reset();
                self.wizard.session_mut().clear();
                self.persistence.clear();
                Ok(report)
            }
            Err(e) => {
                self.persistence.record_uploaded(&uploaded);
                Err(e)
            }
        }
    }

    // ---- 内部 ----

    fn after_change(&mut self, before: u8, now_ms: u64) {
        if self.wizard.step() > before {
            self.persistence.clear_transient();
        }
        self.save_with(now_ms, false);
    }

    fn save_with(&mut self, now_ms: u64, force: bool) -> SaveOutcome {
        let allowed = if force { self.guard.can_force_save() } else { self.guard.can_save() };
        if !allowed || self.guard.transition(Phase::Saving).is_err() {
            log::debug!("snapshot write skipped while {:?}", self.guard.phase());
            self.dirty = true;
            return SaveOutcome::Blocked;
        }

        let outcome = if force {
            self.persistence
                .force_save(self.wizard.state(), self.wizard.session(), now_ms)
        } else {
            self.persistence
                .save(self.wizard.state(), self.wizard.session(), now_ms)
        };
        match outcome {
            SaveOutcome::Written => {
                self.wizard.stamp_saved(now_ms);
                self.dirty = false;
            }
            SaveOutcome::NotNeeded => self.dirty = false,
            SaveOutcome::Throttled | SaveOutcome::Failed | SaveOutcome::Blocked => self.dirty = true,
        }
        self.finish_phase();
        outcome
    }

    fn try_restore(&mut self, now_ms: u64) -> bool {
        if !self.guard.can_restore() || !self.persistence.has_snapshot() {
            return false;
        }
        if self.guard.transition(Phase::Restoring).is_err() {
            return false;
        }

        let restored = self
            .persistence
            .restore(self.wizard.codec(), self.on_upload_route());
        let applied = match restored {
            Some(state) if self.guard.is_mounted() => {
                self.wizard.replace_state(state);
                let route = self.route.clone();
                let session = self.wizard.session_mut();
                session.assert_in_progress();
                session.current_path = Some(route);
                self.persistence.write_session(self.wizard.session());
                self.guard.mark_restored();
                self.dirty = false;
                log::debug!("upload state restored at {}", now_ms);
                true
            }
            _ => false,
        };
        self.finish_phase();
        applied
    }

    fn finish_phase(&mut self) {
        if let Err(e) = self.guard.transition(Phase::Idle) {
            log::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryStore, TEMP_SCREENSHOTS_KEY, UPLOAD_STATE_KEY};
    use crate::types::TagSubStep;

    const LINK: &str = "https://apps.apple.com/us/app/x/id123";

    fn config() -> FlowConfig {
        FlowConfig {
            save_throttle_ms: 100,
            lifecycle: LifecycleConfig { restore_delay_ms: 100, cooldown_ms: 1_000 },
            ..Default::default()
        }
    }

    fn mounted_flow() -> UploadFlow<MemoryStore> {
        let mut flow = UploadFlow::new(MemoryStore::new(), config());
        flow.mount(DEFAULT_UPLOAD_ROUTE, 0);
        flow
    }

    fn record() -> AppRecord {
        AppRecord { app_id: "123".into(), name: "X".into(), ..Default::default() }
    }

    fn png(name: &str) -> RawFile {
        RawFile::new(name, "image/png", vec![7; 12])
    }

    fn flow_at_step_three() -> UploadFlow<MemoryStore> {
        let mut flow = mounted_flow();
        flow.submit_link(LINK, 1_000).unwrap();
        flow.confirm_metadata(record(), &[], &[], 2_000).unwrap();
        flow
    }

    /// 新しいマウントとして同じストアを開き直す
    fn remount(flow: UploadFlow<MemoryStore>, now_ms: u64) -> (UploadFlow<MemoryStore>, bool) {
        let store = flow.persistence.into_store();
        let mut next = UploadFlow::new(store, config());
        let restored = next.mount(DEFAULT_UPLOAD_ROUTE, now_ms);
        (next, restored)
    }

    #[test]
    fn test_changes_are_saved() {
        let flow = flow_at_step_three();
        assert!(flow.persistence().has_snapshot());
        assert_eq!(flow.state().saved_at(), Some(2_000));
    }

    #[test]
    fn test_rapid_changes_are_throttled() {
        let mut flow = mounted_flow();
        flow.submit_link(LINK, 1_000).unwrap();
        flow.confirm_metadata(record(), &[], &[], 1_050).unwrap();
        assert_eq!(flow.state().saved_at(), Some(1_000));
    }

    #[test]
    fn test_hidden_forces_save_inside_throttle_window() {
        let mut flow = flow_at_step_three();
        flow.select_category(CategoryRef::new("home"), 2_010).unwrap();
        assert_eq!(flow.state().saved_at(), Some(2_000));

        let action = flow.on_visibility(Visibility::Hidden, 2_020);
        assert_eq!(action, VisibilityAction::ForceSave);
        assert_eq!(flow.state().saved_at(), Some(2_020));

        let (restored, applied) = remount(flow, 3_000);
        assert!(applied);
        assert_eq!(restored.state().pending_category(), Some(&CategoryRef::new("home")));
    }

    #[test]
    fn test_remount_restores_and_reasserts_flags() {
        let mut flow = flow_at_step_three();
        flow.select_category(CategoryRef::new("home"), 3_000).unwrap();
        flow.upload_batch(vec![png("a.png"), png("b.png")], 4_000).unwrap();

        let (next, applied) = remount(flow, 5_000);
        assert!(applied);
        assert_eq!(next.state().step(), 4);
        assert_eq!(next.state().screenshots().len(), 2);
        assert_eq!(next.state().tag_sub_step(), TagSubStep::Elements);
        assert!(next.session().upload_in_progress);
        assert!(next.session().prevent_auth_redirects);
        assert!(next.guard().restored_this_mount());
        assert_eq!(
            next.state().screenshots()[1].payload.bytes(),
            Some(&[7u8; 12][..])
        );
    }

    #[test]
    fn test_mount_off_route_does_not_restore() {
        let flow = flow_at_step_three();
        let store = flow.persistence.into_store();
        let mut next = UploadFlow::new(store, config());
        assert!(!next.mount("/gallery", 5_000));
        assert_eq!(next.state().step(), 1);
    }

    #[test]
    fn test_two_visible_events_one_restore() {
        let flow = flow_at_step_three();
        let store = flow.persistence.into_store();

        // 空の状態でマウントし直し、直後に表示復帰が2回来る
        let mut next = UploadFlow::new(store, config());
        next.guard.mount();
        next.route = DEFAULT_UPLOAD_ROUTE.to_string();

        assert!(matches!(
            next.on_visibility(Visibility::Visible, 10_000),
            VisibilityAction::RestoreScheduled { at_ms: 10_100 }
        ));
        assert_eq!(next.on_visibility(Visibility::Visible, 10_050), VisibilityAction::Ignored);
        assert!(next.session().tab_switched);

        assert_eq!(next.poll(10_100), vec![Due::Restore]);
        assert_eq!(next.state().step(), 3);
        assert!(next.poll(10_200).is_empty());
        assert_eq!(next.poll(11_100), vec![Due::CooldownElapsed]);
        assert!(!next.session().tab_switched);
    }

    #[test]
    fn test_saves_blocked_during_restore_window() {
        let mut flow = flow_at_step_three();
        flow.on_visibility(Visibility::Visible, 5_000);
        flow.select_category(CategoryRef::new("home"), 5_010).unwrap();
        assert_eq!(flow.state().saved_at(), Some(2_000));

        flow.poll(5_100);
        flow.poll(6_100);
        flow.select_category(CategoryRef::new("login"), 6_200).unwrap();
        assert_eq!(flow.state().saved_at(), Some(6_200));
    }

    #[test]
    fn test_back_to_step_one_drops_snapshot() {
        let mut flow = mounted_flow();
        flow.submit_link(LINK, 1_000).unwrap();
        assert!(flow.persistence().has_snapshot());

        assert_eq!(flow.go_back(1_050), 1);
        assert!(!flow.persistence().has_snapshot());
        assert_eq!(flow.on_visibility(Visibility::Hidden, 1_100), VisibilityAction::Ignored);
        flow.unmount();

        let (next, applied) = remount(flow, 5_000);
        assert!(!applied);
        assert_eq!(next.state().step(), 1);
    }

    #[test]
    fn test_hide_after_restore_saves_edits_in_cooldown() {
        let mut flow = flow_at_step_three();
        assert_eq!(flow.on_visibility(Visibility::Hidden, 3_000), VisibilityAction::ForceSave);
        flow.on_visibility(Visibility::Visible, 4_000);
        assert_eq!(flow.poll(4_100), vec![Due::Restore]);

        // 復元後のクールダウン中の変更は通常保存されない
        flow.select_category(CategoryRef::new("home"), 4_500).unwrap();
        assert_eq!(flow.state().saved_at(), Some(3_000));

        assert_eq!(flow.on_visibility(Visibility::Hidden, 4_600), VisibilityAction::ForceSave);
        assert_eq!(flow.state().saved_at(), Some(4_600));

        let (next, applied) = remount(flow, 9_000);
        assert!(applied);
        assert_eq!(next.state().pending_category(), Some(&CategoryRef::new("home")));
    }

    #[test]
    fn test_hide_while_restore_pending_is_deferred() {
        let mut flow = flow_at_step_three();
        flow.on_visibility(Visibility::Visible, 4_000);
        assert_eq!(flow.on_visibility(Visibility::Hidden, 4_050), VisibilityAction::SaveDeferred);
    }

    #[test]
    fn test_cooldown_end_saves_pending_edits() {
        let mut flow = flow_at_step_three();
        flow.on_visibility(Visibility::Visible, 4_000);
        flow.poll(4_100);
        flow.select_category(CategoryRef::new("login"), 4_500).unwrap();
        assert_eq!(flow.state().saved_at(), Some(2_000));

        assert_eq!(flow.poll(5_100), vec![Due::CooldownElapsed]);
        assert_eq!(flow.state().saved_at(), Some(5_100));

        let (next, _) = remount(flow, 9_000);
        assert_eq!(next.state().pending_category(), Some(&CategoryRef::new("login")));
    }

    #[test]
    fn test_access_suppressed_while_uploading() {
        let mut flow = flow_at_step_three();
        let decision = flow.check_access(&Resolution::Ready(None), &Resolution::Ready(AccessLevel::Basic));
        assert!(matches!(decision, GateDecision::Suppressed(_)));
        assert_eq!(flow.guard().phase(), Phase::Idle);
    }

    #[test]
    fn test_access_redirect_once() {
        let mut flow = mounted_flow();
        let anonymous = Resolution::Ready(None);
        let level = Resolution::Ready(AccessLevel::Basic);
        assert!(matches!(flow.check_access(&anonymous, &level), GateDecision::Redirect(_)));
        assert!(matches!(flow.check_access(&anonymous, &level), GateDecision::Suppressed(_)));

        flow.unmount();
        flow.mount(DEFAULT_UPLOAD_ROUTE, 0);
        assert!(matches!(flow.check_access(&anonymous, &level), GateDecision::Redirect(_)));
    }

    #[test]
    fn test_navigate_away_without_marker_discards() {
        let mut flow = mounted_flow();
        flow.navigate("/gallery", 10);
        assert_eq!(flow.state().step(), 1);
        assert!(flow.persistence().store().is_empty());
    }

    #[test]
    fn test_navigate_away_in_progress_keeps_state() {
        let mut flow = flow_at_step_three();
        flow.navigate("/pricing", 5_000);
        assert_eq!(flow.state().step(), 3);
        assert!(flow.persistence().has_snapshot());

        flow.navigate(DEFAULT_UPLOAD_ROUTE, 5_100);
        assert_eq!(flow.session().current_path.as_deref(), Some(DEFAULT_UPLOAD_ROUTE));
    }

    #[test]
    fn test_transient_cache_cleared_on_advance() {
        let mut flow = flow_at_step_three();
        flow.select_category(CategoryRef::new("home"), 3_000).unwrap();
        flow.upload_batch(vec![png("a.png")], 4_000).unwrap();
        assert!(flow.persistence().store().contains(TEMP_SCREENSHOTS_KEY).unwrap());

        flow.tag_current(vec![ElementRef::new("nav-bar")], 5_000).unwrap();
        assert_eq!(flow.state().step(), 5);
        assert!(!flow.persistence().store().contains(TEMP_SCREENSHOTS_KEY).unwrap());
    }

    #[test]
    fn test_cancel_clears_store() {
        let mut flow = flow_at_step_three();
        flow.cancel();
        flow.cancel();
        assert_eq!(flow.state().step(), 1);
        assert!(!flow.persistence().store().contains(UPLOAD_STATE_KEY).unwrap());
        assert!(flow.persistence().store().is_empty());
        assert!(!flow.session().upload_in_progress);
    }
}
