//! Scripted two-user exchange. Talks to the server named by INBOX_REMOTE_HOST,
//! or runs against in-memory mirrors when it is unset.

use pawpost::client::inbox::Inbox;
use pawpost::client::services::remote_api::{RemoteApi, TcpRemoteApi};
use pawpost::client::storage::MemoryStore;
use pawpost::common::models::UserProfile;
use pawpost::server::config::ClientConfig;
use std::sync::Arc;

struct Participant {
    inbox: Inbox,
    profile: UserProfile,
    token: Option<String>,
}

impl Participant {
    async fn sign_in(&mut self) {
        self.inbox.set_current_user(Some(self.profile.clone()), self.token.clone()).await;
    }

    fn show(&self, label: &str) {
        let view = self.inbox.thread_list();
        println!("{} badge={:?}", label, view.badge.label());
        for entry in &view.entries {
            println!("  {} | {} | unread={}", entry.name, entry.preview, entry.unread);
        }
    }
}

async fn remote_pair(host: &str) -> anyhow::Result<(Participant, Participant)> {
    println!("Using host {}", host);
    let api = TcpRemoteApi::new(host);
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();

    let alice_token = api.register(&format!("alice_{}", suffix), "pw-alice", "", "Turin").await?;
    let alice = api.whoami(&alice_token).await?;
    let bob_token = api.register(&format!("bob_{}", suffix), "pw-bob", "555-0101", "").await?;
    let bob = api.whoami(&bob_token).await?;

    let shared: Arc<dyn RemoteApi> = Arc::new(api);
    Ok((
        Participant { inbox: Inbox::synced(shared.clone()), profile: alice, token: Some(alice_token) },
        Participant { inbox: Inbox::synced(shared), profile: bob, token: Some(bob_token) },
    ))
}

fn offline_pair() -> (Participant, Participant) {
    println!("No INBOX_REMOTE_HOST, using in-memory mirrors");
    let store = Arc::new(MemoryStore::new());
    (
        Participant {
            inbox: Inbox::offline(store.clone()),
            profile: UserProfile::new("alice", "Alice").with_city("Turin"),
            token: None,
        },
        Participant {
            inbox: Inbox::offline(store),
            profile: UserProfile::new("bob", "Bob").with_phone("555-0101"),
            token: None,
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pawpost::utils::logger::init("info");
    let cfg = ClientConfig::from_env();
    let (mut alice, mut bob) = match &cfg.remote_host {
        Some(host) => remote_pair(host).await?,
        None => offline_pair(),
    };

    alice.sign_in().await;
    alice.inbox.open(&bob.profile).await?;
    alice.inbox.set_draft("Is Luna still available?");
    alice.inbox.submit().await?;
    alice.show("ALICE");

    bob.sign_in().await;
    bob.show("BOB before open");
    bob.inbox.open(&alice.profile).await?;
    bob.inbox.send(&alice.profile, "Yes! Want to meet her on Saturday?").await?;
    bob.show("BOB after reply");

    alice.inbox.refresh(true).await?;
    alice.show("ALICE after refresh");
    Ok(())
}
