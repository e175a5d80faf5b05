use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

use crate::common::protocol::{self, Command, INVALID_SESSION, SESSION_MARKER};
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::{auth, messages};

const HELP: &str = "Commands: /register <user> <pass> [phone] [city], /login <user> <pass>, /logout <token>, \
/me <token>, /lookup <token> <user>, /threads <token>, /history <token> <user_id>, /send <token> <user_id> <text>, /quit";

#[derive(Clone)]
pub struct Server {
    pub db: Arc<Database>,
    pub config: ServerConfig,
}

impl Server {
    pub fn new(db: Arc<Database>, config: ServerConfig) -> Self {
        Self { db, config }
    }

    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("[SERVER] Listening on {}", addr);
        self.serve(listener).await
    }

    /// Accept loop over an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            log::info!("[SERVER] New connection from {}", peer);
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_client(stream, peer).await {
                    log::warn!("[SERVER] Client error ({}): {}", peer, e);
                }
            });
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                log::info!("[SERVER] {} disconnected", peer);
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let (response, quit) = self.handle_line(&line).await;
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            if quit {
                break;
            }
        }
        Ok(())
    }

    /// Handle one request line. The flag is set when the client asked to quit.
    pub async fn handle_line(&self, line: &str) -> (String, bool) {
        match Command::parse(line) {
            Ok(Command::Quit) => (protocol::ok("Disconnected"), true),
            Ok(cmd) => (self.handle_command(cmd).await, false),
            Err(e) => (protocol::err(&e), false),
        }
    }

    pub async fn handle_command(&self, cmd: Command) -> String {
        let db = self.db.as_ref();
        match cmd {
            Command::Register { username, password, phone, city } => {
                match auth::register(db, &username, &password, &phone, &city, &self.config).await {
                    Ok((user, token)) => protocol::ok(&format!("Registered as {} {} {}", user.name, SESSION_MARKER, token)),
                    Err(e) => protocol::err(&e),
                }
            }
            Command::Login { username, password } => match auth::login(db, &username, &password, &self.config).await {
                Ok((user, token)) => protocol::ok(&format!("Logged in as {} {} {}", user.name, SESSION_MARKER, token)),
                Err(e) => protocol::err(&e),
            },
            Command::Logout { token } => match auth::logout(db, &token).await {
                Ok(()) => protocol::ok("Logged out"),
                Err(e) => protocol::err(&e),
            },
            Command::Me { token } => {
                let Some(uid) = auth::validate_session(db, &token).await else {
                    return protocol::err(INVALID_SESSION);
                };
                match auth::get_profile(db, &uid).await {
                    Ok(Some(profile)) => protocol::ok_json(&profile),
                    Ok(None) => protocol::err("User not found"),
                    Err(e) => protocol::err(&e),
                }
            }
            Command::Lookup { token, username } => {
                if auth::validate_session(db, &token).await.is_none() {
                    return protocol::err(INVALID_SESSION);
                }
                match auth::find_by_username(db, &username).await {
                    Ok(Some(profile)) => protocol::ok_json(&profile),
                    Ok(None) => protocol::err("User not found"),
                    Err(e) => protocol::err(&e),
                }
            }
            Command::Threads { token } => {
                let Some(uid) = auth::validate_session(db, &token).await else {
                    return protocol::err(INVALID_SESSION);
                };
                match messages::list_threads(db, &uid).await {
                    Ok(threads) => protocol::ok_json(&threads),
                    Err(e) => protocol::err(&e),
                }
            }
            Command::History { token, user_id } => {
                let Some(uid) = auth::validate_session(db, &token).await else {
                    return protocol::err(INVALID_SESSION);
                };
                match messages::conversation_with(db, &uid, &user_id).await {
                    Ok(history) => protocol::ok_json(&history),
                    Err(e) => protocol::err(&e),
                }
            }
            Command::Send { token, user_id, text } => {
                let Some(uid) = auth::validate_session(db, &token).await else {
                    return protocol::err(INVALID_SESSION);
                };
                match messages::send_message(db, &uid, &user_id, &text, &self.config).await {
                    Ok(message) => protocol::ok_json(&message),
                    Err(e) => protocol::err(&e),
                }
            }
            Command::Help => protocol::ok(HELP),
            Command::Quit => protocol::ok("Disconnected"),
        }
    }
}
