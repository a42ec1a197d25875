use tracing::warn;

/// Well-known command codes on the legacy text path.
///
/// These are wire values, not an exhaustive enum — producers accept further
/// engine-specific codes the bridge passes through untouched.
pub mod codes {
    pub const QUIT: i32 = 0;
    pub const RESTART: i32 = 1;
    pub const MAP_HACK: i32 = 2;
    pub const REQUEST_IMAGE: i32 = 3;
    pub const EXIT_PROCESS: i32 = 4;
    pub const NOOP: i32 = 5;
    pub const SET_SPEED: i32 = 6;
    pub const SET_LOG: i32 = 7;
    pub const SET_GUI: i32 = 8;
    pub const SET_FRAMESKIP: i32 = 9;
    pub const SET_CMD_OPTIM: i32 = 10;
    pub const SET_COMBINE_FRAMES: i32 = 11;
    /// Trailing argument is a raw map path string, not an integer.
    pub const SET_MAP: i32 = 12;
    pub const SET_MULTI: i32 = 13;
}

/// One decoded command record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: i32,
    pub args: Vec<i32>,
    /// Set only for [`codes::SET_MAP`].
    pub str_arg: Option<String>,
}

impl Command {
    pub fn new(code: i32, args: Vec<i32>) -> Self {
        Self {
            code,
            args,
            str_arg: None,
        }
    }

    pub fn set_map(path: impl Into<String>) -> Self {
        Self {
            code: codes::SET_MAP,
            args: Vec::new(),
            str_arg: Some(path.into()),
        }
    }
}

/// Decode a colon-delimited batch of comma-delimited command records.
///
/// A record that fails to parse is logged and skipped; the rest of the batch
/// still decodes (`"5,3:bogus:7,1,2"` yields exactly two commands). This is
/// deliberate partial-batch tolerance, never all-or-nothing.
pub fn decode_batch(text: &str) -> Vec<Command> {
    let mut commands = Vec::new();
    for record in text.split(':') {
        if record.is_empty() {
            continue;
        }
        match decode_record(record) {
            Ok(command) => commands.push(command),
            Err(err) => {
                warn!(record, %err, "skipping malformed command record");
            }
        }
    }
    commands
}

/// Encode commands back into the legacy text form.
pub fn encode_batch(commands: &[Command]) -> String {
    let records: Vec<String> = commands
        .iter()
        .map(|command| {
            let mut fields = vec![command.code.to_string()];
            fields.extend(command.args.iter().map(|arg| arg.to_string()));
            if let Some(path) = &command.str_arg {
                fields.push(path.clone());
            }
            fields.join(",")
        })
        .collect();
    records.join(":")
}

fn decode_record(record: &str) -> Result<Command, String> {
    let (code_text, rest) = match record.split_once(',') {
        Some((code, rest)) => (code, Some(rest)),
        None => (record, None),
    };

    let code = code_text
        .parse::<i32>()
        .map_err(|_| format!("non-numeric code {code_text:?}"))?;

    if code == codes::SET_MAP {
        let path = rest.unwrap_or_default();
        return Ok(Command {
            code,
            args: Vec::new(),
            str_arg: Some(path.to_string()),
        });
    }

    let mut args = Vec::new();
    if let Some(rest) = rest {
        for field in rest.split(',') {
            let arg = field
                .parse::<i32>()
                .map_err(|_| format!("non-numeric argument {field:?}"))?;
            args.push(arg);
        }
    }

    Ok(Command {
        code,
        args,
        str_arg: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_batch() {
        let commands = decode_batch("5,3:7,1,2");
        assert_eq!(
            commands,
            vec![Command::new(5, vec![3]), Command::new(7, vec![1, 2])]
        );
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let commands = decode_batch("5,3:bogus:7,1,2");
        assert_eq!(
            commands,
            vec![Command::new(5, vec![3]), Command::new(7, vec![1, 2])]
        );
    }

    #[test]
    fn set_map_keeps_string_argument() {
        let commands = decode_batch("12,maps/micro/m5v5.scm");
        assert_eq!(commands, vec![Command::set_map("maps/micro/m5v5.scm")]);
    }

    #[test]
    fn bad_argument_drops_only_that_record() {
        let commands = decode_batch("6,24:9,x:5");
        assert_eq!(
            commands,
            vec![Command::new(6, vec![24]), Command::new(5, vec![])]
        );
    }

    #[test]
    fn empty_batch_decodes_to_nothing() {
        assert!(decode_batch("").is_empty());
        assert!(decode_batch(":::").is_empty());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let commands = vec![
            Command::new(codes::SET_SPEED, vec![10]),
            Command::set_map("maps/m.scm"),
            Command::new(codes::NOOP, vec![]),
        ];
        assert_eq!(decode_batch(&encode_batch(&commands)), commands);
    }
}
