//! Line-oriented terminal front end over [`Inbox`].

use std::io::Write;
use std::sync::Arc;

use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::inbox::conversation::ConversationBody;
use crate::client::inbox::events::{InboxEvent, NoticeLevel};
use crate::client::inbox::Inbox;
use crate::client::services::remote_api::{RemoteApi, TcpRemoteApi};
use crate::client::storage::FileStore;
use crate::client::utils::session_store::SessionStore;
use crate::common::models::{Direction, UserProfile};
use crate::server::config::ClientConfig;

const HELP: &str = "\
/register <user> <pass> [phone] [city]   create an account (server mode)
/login <user> [pass]                     sign in (offline mode only needs the name)
/logout                                  sign out
/threads                                 list conversations
/open <user>                             open a conversation
/send <user> <text>                      send without opening
/close                                   close the open conversation
/refresh                                 reload the thread list
/quit                                    exit
Any other line is sent to the open conversation.";

enum Backend {
    Synced(TcpRemoteApi),
    Offline,
}

pub struct Cli {
    inbox: Inbox,
    backend: Backend,
    sessions: SessionStore,
    events: UnboundedReceiver<InboxEvent>,
}

impl Cli {
    pub fn from_config(config: &ClientConfig) -> Self {
        let (mut inbox, backend) = match &config.remote_host {
            Some(host) => {
                let api = TcpRemoteApi::new(host.clone());
                let shared: Arc<dyn RemoteApi> = Arc::new(api.clone());
                (Inbox::synced(shared), Backend::Synced(api))
            }
            None => (Inbox::offline(FileStore::new(config.mirror_dir.clone())), Backend::Offline),
        };
        let events = inbox.subscribe();
        Self { inbox, backend, sessions: SessionStore::from_config(config), events }
    }

    fn remote(&self) -> Option<TcpRemoteApi> {
        match &self.backend {
            Backend::Synced(api) => Some(api.clone()),
            Backend::Offline => None,
        }
    }

    /// Sign back in with a stored credential, if there is one.
    pub async fn restore_session(&mut self) {
        let Some(api) = self.remote() else { return };
        let Some(token) = self.sessions.load() else { return };
        let who = api.whoami(&token).await;
        match who {
            Ok(profile) => {
                println!("[CLIENT] Welcome back, {}", profile.display_name());
                self.inbox.set_current_user(Some(profile), Some(token)).await;
            }
            Err(e) => {
                log::info!("[CLIENT] stored session rejected: {}", e);
                if let Err(e) = self.sessions.clear() {
                    log::warn!("[CLIENT] stale session not removed: {}", e);
                }
            }
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("[CLIENT] Type /help for commands");
        self.restore_session().await;
        self.flush_events();

        let mut input = BufReader::new(stdin());
        let mut line = String::new();
        loop {
            line.clear();
            print!("> ");
            std::io::stdout().flush()?;
            if input.read_line(&mut line).await? == 0 {
                break;
            }
            let cmd = line.trim();
            if cmd.is_empty() {
                continue;
            }
            if cmd == "/quit" {
                break;
            }
            self.dispatch(cmd).await;
            self.flush_events();
        }
        Ok(())
    }

    async fn dispatch(&mut self, cmd: &str) {
        let mut parts = cmd.splitn(3, ' ');
        let head = parts.next().unwrap_or("");
        let first = parts.next().unwrap_or("").trim();
        let rest = parts.next().unwrap_or("").trim();

        match head {
            "/help" => println!("{}", HELP),
            "/register" => self.register(cmd).await,
            "/login" => self.login(first, rest).await,
            "/logout" => self.logout().await,
            "/threads" => self.print_threads(),
            "/refresh" => {
                if self.inbox.refresh(true).await.is_ok() {
                    self.print_threads();
                }
            }
            "/open" if !first.is_empty() => {
                if let Some(profile) = self.resolve(first).await {
                    if self.inbox.open(&profile).await.is_ok() {
                        self.print_conversation();
                    }
                }
            }
            "/send" if !first.is_empty() && !rest.is_empty() => {
                if let Some(profile) = self.resolve(first).await {
                    let _ = self.inbox.send(&profile, rest).await;
                }
            }
            "/close" => self.inbox.close(),
            _ if head.starts_with('/') => println!("[CLIENT] Unknown command, try /help"),
            _ => {
                if self.inbox.active_thread().is_none() {
                    println!("[CLIENT] Open a conversation first: /open <user>");
                    return;
                }
                self.inbox.set_draft(cmd);
                if let Ok(Some(_)) = self.inbox.submit().await {
                    self.print_conversation();
                }
            }
        }
    }

    async fn register(&mut self, cmd: &str) {
        let Some(api) = self.remote() else {
            println!("[CLIENT] Offline mode has no accounts, use /login <name>");
            return;
        };
        let args: Vec<&str> = cmd.split_whitespace().skip(1).collect();
        if args.len() < 2 {
            println!("[CLIENT] Usage: /register <user> <pass> [phone] [city]");
            return;
        }
        let phone = args.get(2).copied().unwrap_or("");
        let city = if args.len() > 3 { args[3..].join(" ") } else { String::new() };
        let registered = api.register(args[0], args[1], phone, &city).await;
        match registered {
            Ok(token) => self.start_session(token).await,
            Err(e) => println!("[SERVER][ERROR] {}", e),
        }
    }

    async fn login(&mut self, username: &str, password: &str) {
        if username.is_empty() {
            println!("[CLIENT] Usage: /login <user> [pass]");
            return;
        }
        let Some(api) = self.remote() else {
            let profile = UserProfile::new(username, username);
            println!("[CLIENT] Using local inbox of {}", username);
            self.inbox.set_current_user(Some(profile), None).await;
            return;
        };
        let logged_in = api.login(username, password).await;
        match logged_in {
            Ok(token) => self.start_session(token).await,
            Err(e) => println!("[SERVER][ERROR] {}", e),
        }
    }

    async fn start_session(&mut self, token: String) {
        let Some(api) = self.remote() else { return };
        let who = api.whoami(&token).await;
        match who {
            Ok(profile) => {
                if let Err(e) = self.sessions.save(&token) {
                    log::warn!("[CLIENT] session not persisted: {}", e);
                }
                println!("[CLIENT] Signed in as {}", profile.display_name());
                self.inbox.set_current_user(Some(profile), Some(token)).await;
            }
            Err(e) => println!("[SERVER][ERROR] {}", e),
        }
    }

    async fn logout(&mut self) {
        if let Backend::Synced(api) = &self.backend {
            if let Some(token) = self.inbox.session().and_then(|s| s.token()) {
                if let Err(e) = api.logout(token).await {
                    log::warn!("[CLIENT] logout: {}", e);
                }
            }
        }
        if let Err(e) = self.sessions.clear() {
            log::warn!("[CLIENT] stored session not removed: {}", e);
        }
        self.inbox.set_current_user(None, None).await;
        println!("[CLIENT] Signed out");
    }

    /// Turn a username into a profile to message.
    async fn resolve(&self, username: &str) -> Option<UserProfile> {
        if let Some(thread) = self
            .inbox
            .threads()
            .iter()
            .find(|t| t.id() == username || t.counterpart.name == username)
        {
            return Some(thread.counterpart.clone());
        }
        match &self.backend {
            Backend::Offline => Some(UserProfile::new(username, username)),
            Backend::Synced(api) => {
                let token = self.inbox.session().and_then(|s| s.token())?;
                match api.lookup(token, username).await {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        println!("[SERVER][ERROR] {}", e);
                        None
                    }
                }
            }
        }
    }

    fn print_threads(&self) {
        let view = self.inbox.thread_list();
        if view.is_empty() {
            println!("No conversations yet");
            return;
        }
        if let Some(label) = view.badge.label() {
            println!("Unread: {}", label);
        }
        for entry in &view.entries {
            let badge = entry.badge.as_deref().map(|b| format!(" [{}]", b)).unwrap_or_default();
            println!("  {}{}  {}  {}", entry.name, badge, entry.time, entry.preview);
        }
    }

    fn print_conversation(&self) {
        let Some(render) = self.inbox.conversation() else { return };
        println!("== {} ({})", render.title, render.meta);
        println!("   {}", render.hint);
        match render.body {
            ConversationBody::Empty(prompt) => println!("   {}", prompt),
            ConversationBody::Messages(bubbles) => {
                for bubble in bubbles {
                    let who = match bubble.direction {
                        Direction::Outgoing => "me",
                        Direction::Incoming => "them",
                    };
                    println!("   [{}] {}: {}", bubble.time, who, bubble.text);
                }
            }
        }
    }

    fn flush_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let InboxEvent::Notice(notice) = event {
                match notice.level {
                    NoticeLevel::Error => println!("[ERROR] {}", notice.text),
                    NoticeLevel::Success => println!("[OK] {}", notice.text),
                    NoticeLevel::Info => println!("[INFO] {}", notice.text),
                }
            }
        }
    }
}

pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let mode = if config.is_offline() { "offline" } else { "server" };
    log::info!("[CLIENT] starting in {} mode", mode);
    Cli::from_config(&config).run().await
}
