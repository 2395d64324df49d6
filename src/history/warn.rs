use crate::error::WarnCode;

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: WarnCode,
    pub stage: &'a str,
    pub action: &'a str,
    pub chat: &'a str,
    pub cursor: &'a str,
    pub retry: &'a str,
    pub reason: &'a str,
}

impl<'a> WarnEvent<'a> {
    pub fn new(code: WarnCode, stage: &'a str) -> Self {
        Self {
            code,
            stage,
            action: "",
            chat: "",
            cursor: "",
            retry: "",
            reason: "",
        }
    }

    fn render(&self) -> String {
        format!(
            "CHATLOG_WARN code={} stage={} action={} chat={} cursor={} retry={} reason={}",
            self.code.as_str(),
            sanitize_value(self.stage),
            sanitize_value(self.action),
            sanitize_value(self.chat),
            sanitize_value(self.cursor),
            sanitize_value(self.retry),
            sanitize_value(self.reason),
        )
    }
}

pub fn emit(event: WarnEvent<'_>) {
    eprintln!("{}", event.render());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn rendered_event_is_one_key_value_line() {
        let event = WarnEvent {
            chat: "group:42",
            retry: "1/3",
            reason: "http 503 service unavailable",
            ..WarnEvent::new(WarnCode::W001FetchRetry, "fetch")
        };
        assert_eq!(
            event.render(),
            "CHATLOG_WARN code=W001_FETCH_RETRY stage=fetch action=na chat=group:42 cursor=na retry=1/3 reason=http_503_service_unavailable"
        );
    }
}
