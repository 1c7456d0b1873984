//! アップロード画面へのアクセス判定
//!
//! 認証情報の再チェックがバックグラウンドで走っても、
//! アップロード作業中の利用者を追い出さないようにする。
//! リダイレクトはマウントごとに1回まで。

use crate::session::FlowSession;

/// 非同期に解決される値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Loading,
    Ready(T),
}

impl<T> Resolution<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resolution::Loading)
    }
}

/// ログイン中の利用者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
}

/// 権限レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// 閲覧のみ
    Basic,
    /// アップロード可
    Uploader,
}

/// リダイレクト先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    SignIn,
    Upgrade,
}

/// リダイレクトを抑止した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    UploadInProgress,
    RedirectsPrevented,
    TabSwitched,
    AlreadyChecked,
}

/// 判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 認証情報の読み込み待ち
    Pending,
    Allow,
    Suppressed(SuppressReason),
    Redirect(RedirectTarget),
}

/// アクセスゲート
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    checked: bool,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    /// マウントし直したときに呼ぶ
    pub fn reset(&mut self) {
        self.checked = false;
    }

    pub fn evaluate(
        &mut self,
        identity: &Resolution<Option<Viewer>>,
        level: &Resolution<AccessLevel>,
        session: &FlowSession,
    ) -> GateDecision {
        if let Some(reason) = self.suppression(session) {
            return GateDecision::Suppressed(reason);
        }

        let (Resolution::Ready(viewer), Resolution::Ready(level)) = (identity, level) else {
            return GateDecision::Pending;
        };

        self.checked = true;
        let decision = match (viewer, level) {
            (None, _) => GateDecision::Redirect(RedirectTarget::SignIn),
            (Some(_), AccessLevel::Basic) => GateDecision::Redirect(RedirectTarget::Upgrade),
            (Some(_), AccessLevel::Uploader) => GateDecision::Allow,
        };
        log::debug!("access gate decided {:?}", decision);
        decision
    }

    fn suppression(&self, session: &FlowSession) -> Option<SuppressReason> {
        if self.checked {
            Some(SuppressReason::AlreadyChecked)
        } else if session.upload_in_progress {
            Some(SuppressReason::UploadInProgress)
        } else if session.prevent_auth_redirects {
            Some(SuppressReason::RedirectsPrevented)
        } else if session.tab_switched {
            Some(SuppressReason::TabSwitched)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer() -> Resolution<Option<Viewer>> {
        Resolution::Ready(Some(Viewer { id: "u1".into() }))
    }

    #[test]
    fn test_pending_while_loading() {
        let mut gate = AccessGate::new();
        let session = FlowSession::default();
        assert_eq!(
            gate.evaluate(&Resolution::Loading, &Resolution::Ready(AccessLevel::Uploader), &session),
            GateDecision::Pending
        );
        assert_eq!(
            gate.evaluate(&viewer(), &Resolution::Loading, &session),
            GateDecision::Pending
        );
        assert!(!gate.checked());
    }

    #[test]
    fn test_anonymous_redirects_to_sign_in_once() {
        let mut gate = AccessGate::new();
        let session = FlowSession::default();
        let anonymous = Resolution::Ready(None);
        let level = Resolution::Ready(AccessLevel::Basic);

        assert_eq!(
            gate.evaluate(&anonymous, &level, &session),
            GateDecision::Redirect(RedirectTarget::SignIn)
        );
        assert_eq!(
            gate.evaluate(&anonymous, &level, &session),
            GateDecision::Suppressed(SuppressReason::AlreadyChecked)
        );
    }

    #[test]
    fn test_basic_level_redirects_to_upgrade() {
        let mut gate = AccessGate::new();
        assert_eq!(
            gate.evaluate(&viewer(), &Resolution::Ready(AccessLevel::Basic), &FlowSession::default()),
            GateDecision::Redirect(RedirectTarget::Upgrade)
        );
    }

    #[test]
    fn test_uploader_allowed_and_later_changes_ignored() {
        let mut gate = AccessGate::new();
        let session = FlowSession::default();
        assert_eq!(
            gate.evaluate(&viewer(), &Resolution::Ready(AccessLevel::Uploader), &session),
            GateDecision::Allow
        );
        assert_eq!(
            gate.evaluate(&Resolution::Ready(None), &Resolution::Ready(AccessLevel::Basic), &session),
            GateDecision::Suppressed(SuppressReason::AlreadyChecked)
        );
    }

    #[test]
    fn test_each_flag_suppresses() {
        let anonymous = Resolution::Ready(None);
        let level = Resolution::Ready(AccessLevel::Basic);

        let cases = [
            (
                FlowSession { upload_in_progress: true, ..Default::default() },
                SuppressReason::UploadInProgress,
            ),
            (
                FlowSession { prevent_auth_redirects: true, ..Default::default() },
                SuppressReason::RedirectsPrevented,
            ),
            (
                FlowSession { tab_switched: true, ..Default::default() },
                SuppressReason::TabSwitched,
            ),
        ];

        for (session, reason) in cases {
            let mut gate = AccessGate::new();
            assert_eq!(
                gate.evaluate(&anonymous, &level, &session),
                GateDecision::Suppressed(reason)
            );
            assert!(!gate.checked());
        }
    }

    #[test]
    fn test_reset_allows_new_check() {
        let mut gate = AccessGate::new();
        let session = FlowSession::default();
        gate.evaluate(&Resolution::Ready(None), &Resolution::Ready(AccessLevel::Basic), &session);
        gate.reset();
        assert_eq!(
            gate.evaluate(&viewer(), &Resolution::Ready(AccessLevel::Uploader), &session),
            GateDecision::Allow
        );
    }
}
