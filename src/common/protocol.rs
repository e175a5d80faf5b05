//! Line protocol between the inbox client and the message server.
//!
//! Every request is one line: `/command arg arg ...`. Every response is one line,
//! either `OK: <body>` or `ERR: <message>`. Structured bodies are single-line JSON.

use serde::Serialize;

pub const OK_PREFIX: &str = "OK:";
pub const ERR_PREFIX: &str = "ERR:";
pub const SESSION_MARKER: &str = "SESSION:";
pub const INVALID_SESSION: &str = "Invalid or expired session";
/// Placeholder for an empty optional argument.
pub const EMPTY_ARG: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { username: String, password: String, phone: String, city: String },
    Login { username: String, password: String },
    Logout { token: String },
    Me { token: String },
    Lookup { token: String, username: String },
    Threads { token: String },
    History { token: String, user_id: String },
    Send { token: String, user_id: String, text: String },
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (name, rest) = match line.split_once(' ') {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();
        match name {
            "/register" if args.len() >= 2 => {
                // /register <username> <password> [phone] [city...]
                let phone = args.get(2).filter(|p| **p != EMPTY_ARG).unwrap_or(&"").to_string();
                let city = if args.len() > 3 { args[3..].join(" ") } else { String::new() };
                Ok(Command::Register {
                    username: args[0].to_string(),
                    password: args[1].to_string(),
                    phone,
                    city,
                })
            }
            "/login" if args.len() == 2 => Ok(Command::Login {
                username: args[0].to_string(),
                password: args[1].to_string(),
            }),
            "/logout" if args.len() == 1 => Ok(Command::Logout { token: args[0].to_string() }),
            "/me" if args.len() == 1 => Ok(Command::Me { token: args[0].to_string() }),
            "/lookup" if args.len() == 2 => Ok(Command::Lookup {
                token: args[0].to_string(),
                username: args[1].to_string(),
            }),
            "/threads" if args.len() == 1 => Ok(Command::Threads { token: args[0].to_string() }),
            "/history" if args.len() == 2 => Ok(Command::History {
                token: args[0].to_string(),
                user_id: args[1].to_string(),
            }),
            "/send" => {
                // keep the text verbatim, only the first two args are split off
                let mut parts = rest.splitn(3, ' ');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(token), Some(user_id), Some(text))
                        if !token.is_empty() && !user_id.is_empty() =>
                    {
                        Ok(Command::Send {
                            token: token.to_string(),
                            user_id: user_id.to_string(),
                            text: text.to_string(),
                        })
                    }
                    _ => Err("Usage: /send <token> <user_id> <text>".to_string()),
                }
            }
            "/help" => Ok(Command::Help),
            "/quit" => Ok(Command::Quit),
            "" => Err("Empty command".to_string()),
            other => Err(format!("Unknown or malformed command: {}", other)),
        }
    }

    /// Whether sending the command twice has the same effect as once. Only
    /// these are resent when a reply is lost.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Command::Register { .. } | Command::Logout { .. } | Command::Send { .. })
    }

    pub fn to_line(&self) -> String {
        match self {
            Command::Register { username, password, phone, city } => {
                let phone = if phone.is_empty() { EMPTY_ARG } else { phone.as_str() };
                format!("/register {} {} {} {}", username, password, phone, city)
                    .trim_end()
                    .to_string()
            }
            Command::Login { username, password } => format!("/login {} {}", username, password),
            Command::Logout { token } => format!("/logout {}", token),
            Command::Me { token } => format!("/me {}", token),
            Command::Lookup { token, username } => format!("/lookup {} {}", token, username),
            Command::Threads { token } => format!("/threads {}", token),
            Command::History { token, user_id } => format!("/history {} {}", token, user_id),
            Command::Send { token, user_id, text } => {
                // one request per line
                let text = text.replace("\r\n", " ").replace(['\n', '\r'], " ");
                format!("/send {} {} {}", token, user_id, text)
            }
            Command::Help => "/help".to_string(),
            Command::Quit => "/quit".to_string(),
        }
    }
}

/// Lines that do not parse are rejected by the server without side effects.
pub fn is_replayable_line(line: &str) -> bool {
    Command::parse(line).map(|c| c.is_replayable()).unwrap_or(true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Err(String),
}

impl Response {
    pub fn parse(line: &str) -> Response {
        let line = line.trim();
        if let Some(body) = line.strip_prefix(OK_PREFIX) {
            Response::Ok(body.trim().to_string())
        } else if let Some(msg) = line.strip_prefix(ERR_PREFIX) {
            Response::Err(msg.trim().to_string())
        } else {
            Response::Err(format!("unexpected response format: {}", line))
        }
    }
}

pub fn ok(body: &str) -> String {
    format!("{} {}", OK_PREFIX, body)
}

pub fn ok_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => ok(&json),
        Err(e) => err(&format!("Serialization failed: {}", e)),
    }
}

pub fn err(message: &str) -> String {
    format!("{} {}", ERR_PREFIX, message)
}

/// Pull the session token out of a register/login body.
pub fn extract_session(body: &str) -> Option<String> {
    body.split(SESSION_MARKER)
        .nth(1)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
