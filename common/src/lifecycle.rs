//! ページ表示状態に応じた保存・復元の調停
//!
//! 保存・復元・認証チェックは同時に走らせない。
//! フェーズ遷移は下の表にあるものだけを許可し、それ以外は拒否する。
//!
//! ```text
//! Idle -> Saving -> Idle
//! Idle -> Restoring -> Idle
//! Idle -> AuthChecking -> Idle
//! ```
//!
//! 時刻は呼び出し側から渡す（ms）。遅延実行は `poll` で取り出す。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// 処理フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Saving,
    Restoring,
    AuthChecking,
}

const TRANSITIONS: &[(Phase, Phase)] = &[
    (Phase::Idle, Phase::Saving),
    (Phase::Saving, Phase::Idle),
    (Phase::Idle, Phase::Restoring),
    (Phase::Restoring, Phase::Idle),
    (Phase::Idle, Phase::AuthChecking),
    (Phase::AuthChecking, Phase::Idle),
];

/// ページの表示状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

/// 表示状態の変化に対する対応
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityAction {
    /// 間引きなしで今すぐ保存
    ForceSave,
    /// 保存できなかった（クールダウン明けに保存する）
    SaveDeferred,
    /// 指定時刻に復元を試みる
    RestoreScheduled { at_ms: u64 },
    Ignored,
}

/// 期限が来た処理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Restore,
    CooldownElapsed,
}

/// タイミング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleConfig {
    /// 表示復帰から復元までの待ち時間（認証の再チェックを先に終わらせる）
    pub restore_delay_ms: u64,
    /// 復元後、次の表示イベントを受け付けるまでの時間
    pub cooldown_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            restore_delay_ms: 150,
            cooldown_ms: 1_000,
        }
    }
}

/// ライフサイクルガード
#[derive(Debug, Clone)]
pub struct LifecycleGuard {
    config: LifecycleConfig,
    phase: Phase,
    mounted: bool,
    visibility_handled: bool,
    restored_this_mount: bool,
    overwrite_suppressed: bool,
    restore_at: Option<u64>,
    cooldown_until: Option<u64>,
}

impl LifecycleGuard {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            mounted: false,
            visibility_handled: false,
            restored_this_mount: false,
            overwrite_suppressed: false,
            restore_at: None,
            cooldown_until: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn restored_this_mount(&self) -> bool {
        self.restored_this_mount
    }

    pub fn overwrite_suppressed(&self) -> bool {
        self.overwrite_suppressed
    }

    pub fn mount(&mut self) {
        *self = Self::new(self.config);
        self.mounted = true;
    }

    /// すべてのガードを初期値に戻す
    pub fn unmount(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn transition(&mut self, to: Phase) -> Result<()> {
        if TRANSITIONS.contains(&(self.phase, to)) {
            log::trace!("lifecycle {:?} -> {:?}", self.phase, to);
            self.phase = to;
            Ok(())
        } else {
            Err(Error::InvalidTransition { from: self.phase, to })
        }
    }

    /// 保存してよいか（復元中・上書き抑止中は不可）
    pub fn can_save(&self) -> bool {
        self.mounted && self.phase == Phase::Idle && !self.overwrite_suppressed
    }

    /// 非表示時の強制保存をしてよいか
    ///
    /// 復元待ちの間は不可。復元が済んだ後のクールダウン中は上書き抑止を無視する。
    pub fn can_force_save(&self) -> bool {
        self.mounted && self.phase == Phase::Idle && self.restore_at.is_none()
    }

    /// 復元してよいか（このマウントで未復元の場合のみ）
    pub fn can_restore(&self) -> bool {
        self.mounted && self.phase == Phase::Idle && !self.restored_this_mount
    }

    pub fn mark_restored(&mut self) {
        self.restored_this_mount = true;
    }

    pub fn on_visibility(
        &mut self,
        visibility: Visibility,
        step: u8,
        on_upload_route: bool,
        now_ms: u64,
    ) -> VisibilityAction {
        if !self.mounted {
            return VisibilityAction::Ignored;
        }

        match visibility {
            Visibility::Hidden => {
                if step > 1 && on_upload_route {
                    VisibilityAction::ForceSave
                } else {
                    VisibilityAction::Ignored
                }
            }
            Visibility::Visible => {
                if self.phase == Phase::Restoring || self.visibility_handled {
                    log::debug!("visibility event dropped (restore pending or cooling down)");
                    return VisibilityAction::Ignored;
                }
                self.visibility_handled = true;
                self.overwrite_suppressed = true;
                let at_ms = now_ms + self.config.restore_delay_ms;
                self.restore_at = Some(at_ms);
                self.cooldown_until = Some(at_ms + self.config.cooldown_ms);
                VisibilityAction::RestoreScheduled { at_ms }
            }
        }
    }

    /// 期限が来た処理を取り出す
    ///
    /// 復元はフェーズが Idle になるまで持ち越す。
    pub fn poll(&mut self, now_ms: u64) -> Vec<Due> {
        let mut due = Vec::new();
        if !self.mounted {
            return due;
        }

        if let Some(at) = self.restore_at {
            if at <= now_ms && self.phase == Phase::Idle {
                self.restore_at = None;
                due.push(Due::Restore);
            }
        }

        if let Some(until) = self.cooldown_until {
            if until <= now_ms && self.restore_at.is_none() {
                self.cooldown_until = None;
                self.visibility_handled = false;
                self.overwrite_suppressed = false;
                due.push(Due::CooldownElapsed);
            }
        }
        due
    }

    /// 次に `poll` すべき時刻
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.restore_at, self.cooldown_until) {
            (Some(restore), _) => Some(restore),
            (None, cooldown) => cooldown,
        }
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted() -> LifecycleGuard {
        let mut guard = LifecycleGuard::new(LifecycleConfig {
            restore_delay_ms: 100,
            cooldown_ms: 1_000,
        });
        guard.mount();
        guard
    }

    #[test]
    fn test_transition_table() {
        let mut guard = mounted();
        guard.transition(Phase::Saving).unwrap();
        assert!(matches!(
            guard.transition(Phase::Restoring),
            Err(Error::InvalidTransition { from: Phase::Saving, to: Phase::Restoring })
        ));
        guard.transition(Phase::Idle).unwrap();
        guard.transition(Phase::AuthChecking).unwrap();
        assert!(guard.transition(Phase::Saving).is_err());
        assert!(guard.transition(Phase::AuthChecking).is_err());
        guard.transition(Phase::Idle).unwrap();
        assert!(guard.transition(Phase::Idle).is_err());
    }

    #[test]
    fn test_hidden_forces_save_after_step_one() {
        let mut guard = mounted();
        assert_eq!(guard.on_visibility(Visibility::Hidden, 3, true, 0), VisibilityAction::ForceSave);
        assert_eq!(guard.on_visibility(Visibility::Hidden, 1, true, 0), VisibilityAction::Ignored);
        assert_eq!(guard.on_visibility(Visibility::Hidden, 3, false, 0), VisibilityAction::Ignored);
    }

    #[test]
    fn test_unmounted_ignores_events() {
        let mut guard = LifecycleGuard::default();
        assert_eq!(guard.on_visibility(Visibility::Hidden, 3, true, 0), VisibilityAction::Ignored);
        assert_eq!(guard.on_visibility(Visibility::Visible, 3, true, 0), VisibilityAction::Ignored);
        assert!(!guard.can_save());
    }

    #[test]
    fn test_visible_twice_in_cooldown_restores_once() {
        let mut guard = mounted();
        assert_eq!(
            guard.on_visibility(Visibility::Visible, 3, true, 1_000),
            VisibilityAction::RestoreScheduled { at_ms: 1_100 }
        );
        assert_eq!(guard.on_visibility(Visibility::Visible, 3, true, 1_050), VisibilityAction::Ignored);
        assert!(!guard.can_save());

        assert!(guard.poll(1_099).is_empty());
        assert_eq!(guard.poll(1_100), vec![Due::Restore]);
        assert_eq!(guard.on_visibility(Visibility::Visible, 3, true, 1_500), VisibilityAction::Ignored);
        assert!(guard.poll(1_500).is_empty());

        assert_eq!(guard.poll(2_100), vec![Due::CooldownElapsed]);
        assert!(guard.can_save());
        assert!(matches!(
            guard.on_visibility(Visibility::Visible, 3, true, 2_200),
            VisibilityAction::RestoreScheduled { .. }
        ));
    }

    #[test]
    fn test_restore_waits_for_auth_check() {
        let mut guard = mounted();
        guard.on_visibility(Visibility::Visible, 3, true, 0);
        guard.transition(Phase::AuthChecking).unwrap();
        assert!(guard.poll(500).is_empty());

        guard.transition(Phase::Idle).unwrap();
        assert_eq!(guard.poll(500), vec![Due::Restore]);
    }

    #[test]
    fn test_force_save_allowed_once_restore_applied() {
        let mut guard = mounted();
        assert!(guard.can_force_save());
        guard.on_visibility(Visibility::Visible, 3, true, 1_000);
        assert!(!guard.can_force_save());

        assert_eq!(guard.poll(1_100), vec![Due::Restore]);
        assert!(!guard.can_save());
        assert!(guard.can_force_save());

        guard.transition(Phase::Saving).unwrap();
        assert!(!guard.can_force_save());
    }

    #[test]
    fn test_restore_once_per_mount() {
        let mut guard = mounted();
        assert!(guard.can_restore());
        guard.mark_restored();
        assert!(!guard.can_restore());

        guard.unmount();
        assert!(!guard.restored_this_mount());
        guard.mount();
        assert!(guard.can_restore());
    }

    #[test]
    fn test_next_deadline() {
        let mut guard = mounted();
        assert_eq!(guard.next_deadline(), None);
        guard.on_visibility(Visibility::Visible, 2, true, 0);
        assert_eq!(guard.next_deadline(), Some(100));
        guard.poll(100);
        assert_eq!(guard.next_deadline(), Some(1_100));
    }
}
