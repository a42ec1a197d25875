use crate::error::{Result, SessionError};

/// The protocol version both peers must announce.
pub const PROTOCOL_VERSION: i32 = 22;

/// Setup facts carried by the consumer's welcome message.
///
/// The legacy text form is a comma-separated list of `key=value` tokens, for
/// example `protocol=22,micro_mode=true,map=maps/micro.scm`. Window size and
/// position values are two space-separated integers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Welcome {
    pub protocol: i32,
    pub map: Option<String>,
    pub window_size: Option<(i32, i32)>,
    pub window_pos: Option<(i32, i32)>,
    pub micro_mode: bool,
}

/// What the first inbound text turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A welcome with a matching protocol token.
    Welcome(Welcome),
    /// No `protocol=` token — an ordinary command batch.
    Commands(String),
    /// An empty message; answer with an empty ack and receive again.
    Probe,
}

/// Classify an inbound text against the expected protocol version.
///
/// A present-but-mismatched version is a fatal [`SessionError::ProtocolMismatch`].
/// A missing token means the text is not a welcome at all.
pub fn classify(text: &str, expected_version: i32) -> Result<Classified> {
    if text.is_empty() {
        return Ok(Classified::Probe);
    }
    if !text.contains("protocol=") {
        return Ok(Classified::Commands(text.to_string()));
    }

    let mut welcome = Welcome::default();
    let mut saw_protocol = false;

    for token in text.split(',') {
        let Some((key, value)) = token.split_once('=') else {
            // Welcome tokens are all key=value; anything else is noise the
            // legacy producer never sends, so reject loudly.
            return Err(SessionError::MalformedWelcome(format!(
                "token without '=': {:?}",
                token
            )));
        };
        match key {
            "protocol" => {
                let version = value.parse::<i32>().map_err(|_| {
                    SessionError::MalformedWelcome(format!("non-numeric protocol: {:?}", value))
                })?;
                if version != expected_version {
                    return Err(SessionError::ProtocolMismatch {
                        expected: expected_version,
                        actual: version,
                    });
                }
                welcome.protocol = version;
                saw_protocol = true;
            }
            "map" => welcome.map = Some(value.to_string()),
            "window_size" => welcome.window_size = Some(parse_pair(key, value)?),
            "window_pos" => welcome.window_pos = Some(parse_pair(key, value)?),
            "micro_mode" => welcome.micro_mode = value == "true" || value == "1",
            other => {
                tracing::debug!(key = other, "ignoring unknown welcome token");
            }
        }
    }

    if !saw_protocol {
        // contains() matched inside some value; not a welcome after all.
        return Ok(Classified::Commands(text.to_string()));
    }
    Ok(Classified::Welcome(welcome))
}

/// Render a [`Welcome`] in the legacy text form.
pub fn format_welcome(welcome: &Welcome) -> String {
    let mut text = format!("protocol={}", welcome.protocol);
    if let Some(map) = &welcome.map {
        text.push_str(&format!(",map={map}"));
    }
    if let Some((w, h)) = welcome.window_size {
        text.push_str(&format!(",window_size={w} {h}"));
    }
    if let Some((x, y)) = welcome.window_pos {
        text.push_str(&format!(",window_pos={x} {y}"));
    }
    if welcome.micro_mode {
        text.push_str(",micro_mode=true");
    }
    text
}

fn parse_pair(key: &str, value: &str) -> Result<(i32, i32)> {
    let mut parts = value.split_whitespace();
    let first = parts.next().and_then(|p| p.parse::<i32>().ok());
    let second = parts.next().and_then(|p| p.parse::<i32>().ok());
    match (first, second, parts.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(SessionError::MalformedWelcome(format!(
            "{key} expects two integers, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_protocol_accepted() {
        let result = classify("protocol=22", 22).unwrap();
        assert_eq!(
            result,
            Classified::Welcome(Welcome {
                protocol: 22,
                ..Welcome::default()
            })
        );
    }

    #[test]
    fn mismatched_protocol_is_fatal() {
        let err = classify("protocol=7", 22).unwrap_err();
        assert!(matches!(
            err,
            SessionError::ProtocolMismatch {
                expected: 22,
                actual: 7
            }
        ));
    }

    #[test]
    fn no_token_is_a_command_batch() {
        let result = classify("5,3:7,1,2", 22).unwrap();
        assert_eq!(result, Classified::Commands("5,3:7,1,2".to_string()));
    }

    #[test]
    fn empty_text_is_a_probe() {
        assert_eq!(classify("", 22).unwrap(), Classified::Probe);
    }

    #[test]
    fn side_facts_are_parsed() {
        let text = "protocol=22,map=maps/micro.scm,window_size=640 480,window_pos=10 20,micro_mode=true";
        let Classified::Welcome(welcome) = classify(text, 22).unwrap() else {
            panic!("expected welcome");
        };
        assert_eq!(welcome.map.as_deref(), Some("maps/micro.scm"));
        assert_eq!(welcome.window_size, Some((640, 480)));
        assert_eq!(welcome.window_pos, Some((10, 20)));
        assert!(welcome.micro_mode);
    }

    #[test]
    fn format_roundtrip() {
        let welcome = Welcome {
            protocol: 22,
            map: Some("maps/micro.scm".to_string()),
            window_size: Some((640, 480)),
            window_pos: None,
            micro_mode: true,
        };
        let text = format_welcome(&welcome);
        assert_eq!(classify(&text, 22).unwrap(), Classified::Welcome(welcome));
    }

    #[test]
    fn malformed_protocol_value_rejected() {
        let err = classify("protocol=abc", 22).unwrap_err();
        assert!(matches!(err, SessionError::MalformedWelcome(_)));
    }
}
