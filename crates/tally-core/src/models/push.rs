//! 푸시 메시지 모델.
//!
//! 푸시 제공자가 전달한 데이터 맵을 해석한다. 알림/다이얼로그 표시는
//! 호스트 앱의 몫이고, 여기서는 종류 판별과 유효성만 다룬다.

use std::collections::HashMap;

/// 메시지 열람 이벤트 키
pub const PUSH_OPEN_EVENT: &str = "_push_open";
/// 메시지 액션 이벤트 키
pub const PUSH_ACTION_EVENT: &str = "_push_action";
/// 푸시 이벤트 세그멘테이션의 메시지 ID 키
pub const PUSH_ID_SEGMENT: &str = "i";

const ID_LEN: usize = 24;

/// 알림 사운드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSound {
    Default,
    Uri(String),
}

/// 메시지를 눌렀을 때 수행할 동작
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    OpenLink(String),
    OpenReview,
    OpenApp,
}

/// 수신한 푸시 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub id: Option<String>,
    pub link: Option<String>,
    pub review: Option<String>,
    pub message: Option<String>,
    pub sound: Option<PushSound>,
    pub silent: bool,
}

fn non_empty(data: &HashMap<String, String>, key: &str) -> Option<String> {
    data.get(key).filter(|v| !v.is_empty()).cloned()
}

impl PushMessage {
    /// 제공자 데이터 맵에서 파싱
    pub fn from_data(data: &HashMap<String, String>) -> Self {
        let sound = non_empty(data, "sound").map(|s| {
            if s == "default" {
                PushSound::Default
            } else {
                PushSound::Uri(s)
            }
        });

        Self {
            id: data.get("c.i").cloned(),
            link: non_empty(data, "c.l"),
            review: non_empty(data, "c.r"),
            message: non_empty(data, "message"),
            sound,
            silent: data.get("c.s").map(String::as_str) == Some("true"),
        }
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    pub fn has_review(&self) -> bool {
        self.review.is_some()
    }

    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    /// 종류를 하나도 판별할 수 없는 메시지
    pub fn is_unknown(&self) -> bool {
        !self.has_message()
            && !self.has_link()
            && !self.has_review()
            && !self.silent
            && self.sound.is_none()
    }

    /// 24자 ID가 있고 종류가 판별된 메시지만 유효
    pub fn is_valid(&self) -> bool {
        !self.is_unknown()
            && self
                .id
                .as_deref()
                .is_some_and(|id| id.chars().count() == ID_LEN)
    }

    pub fn action(&self) -> Option<PushAction> {
        if let Some(link) = &self.link {
            Some(PushAction::OpenLink(link.clone()))
        } else if self.has_review() {
            Some(PushAction::OpenReview)
        } else if self.has_message() {
            Some(PushAction::OpenApp)
        } else {
            None
        }
    }

    /// 알림 본문. 링크/리뷰 메시지에 본문이 없으면 대체 문구 사용.
    pub fn notification_text(&self, open_link_text: &str, review_text: &str) -> Option<String> {
        if self.has_link() {
            Some(self.message.clone().unwrap_or_else(|| open_link_text.to_string()))
        } else if self.has_review() {
            Some(self.message.clone().unwrap_or_else(|| review_text.to_string()))
        } else {
            self.message.clone()
        }
    }
}
