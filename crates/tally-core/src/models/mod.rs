//! Tally 도메인 모델.
//!
//! 집계 이벤트, 전송 요청 페이로드, 디바이스 식별자/메트릭, 푸시 메시지를 정의한다.

pub mod device;
pub mod event;
pub mod push;
pub mod request;

/// URL 쿼리 값 인코딩 (`application/x-www-form-urlencoded`)
pub fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(encode_query_value("a b&c=d"), "a+b%26c%3Dd");
        assert_eq!(encode_query_value("{\"k\":1}"), "%7B%22k%22%3A1%7D");
        assert_eq!(encode_query_value("plain-text_1.0"), "plain-text_1.0");
    }
}
