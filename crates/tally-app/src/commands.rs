//! 표준 입력 명령.
//!
//! 한 줄에 명령 하나:
//! `event <key> [count] [sum]`, `open <id>`, `action <id>`, `token <token>`, `quit`

use anyhow::{anyhow, bail, Result};
use tally_session::orchestrator::SessionOrchestrator;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Event {
        key: String,
        count: u32,
        sum: Option<f64>,
    },
    MessageOpen(String),
    MessageAction(String),
    Token(String),
    Quit,
}

impl Command {
    /// 빈 줄은 `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(None);
        };

        let command = match name {
            "event" => {
                let key = parts
                    .next()
                    .ok_or_else(|| anyhow!("사용법: event <key> [count] [sum]"))?;
                let count = parts
                    .next()
                    .map(str::parse::<u32>)
                    .transpose()
                    .map_err(|e| anyhow!("count 파싱 실패: {e}"))?
                    .unwrap_or(1);
                let sum = parts
                    .next()
                    .map(str::parse::<f64>)
                    .transpose()
                    .map_err(|e| anyhow!("sum 파싱 실패: {e}"))?;
                Self::Event {
                    key: key.to_string(),
                    count,
                    sum,
                }
            }
            "open" => Self::MessageOpen(single_arg(parts.next(), "open <id>")?),
            "action" => Self::MessageAction(single_arg(parts.next(), "action <id>")?),
            "token" => Self::Token(single_arg(parts.next(), "token <token>")?),
            "quit" | "exit" => Self::Quit,
            other => bail!("알 수 없는 명령: {other}"),
        };

        if let Some(extra) = parts.next() {
            bail!("불필요한 인자: {extra}");
        }
        Ok(Some(command))
    }

    /// 오케스트레이터에 적용. `Quit`이면 `false`.
    pub fn apply(self, orchestrator: &SessionOrchestrator) -> Result<bool> {
        match self {
            Self::Event { key, count, sum } => {
                orchestrator.record_event(&key, None, count, sum)?;
            }
            Self::MessageOpen(id) => orchestrator.record_message_open(&id)?,
            Self::MessageAction(id) => orchestrator.record_message_action(&id)?,
            Self::Token(token) => orchestrator.on_push_token(&token)?,
            Self::Quit => {
                info!("종료 명령 수신");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn single_arg(arg: Option<&str>, usage: &str) -> Result<String> {
    arg.map(str::to_string)
        .ok_or_else(|| anyhow!("사용법: {usage}"))
}
