use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, error, info};
use parking_lot::Mutex;
use tokio::{
    net::TcpListener,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{is_closed, LoginError},
    handler::{self, status},
    online::{AuthClient, Property},
    protocol::{
        codec::registry::PacketRegistry,
        crypto::EncryptionContext,
        packet::{play::KeepAlive, status::SamplePlayer, PacketType},
        ProtocolVersion,
    },
    world::World,
};

/// Identity of a logged in player.
#[derive(Debug, Clone)]
pub struct Player {
    pub name: String,
    pub uuid: Uuid,
    pub properties: Vec<Property>,
    pub version: ProtocolVersion,
    pub address: SocketAddr,
}

/// Packets pushed into a play connection from outside its task.
pub type PlayerSink = mpsc::UnboundedSender<PacketType>;

struct Entry {
    name: String,
    uuid: Uuid,
    sink: PlayerSink,
    relayed: bool,
}

/// Everyone past the login checks, keyed by lowercase name.
pub struct Players {
    max: usize,
    table: Mutex<HashMap<String, Entry>>,
}

impl Players {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self { max, table: Mutex::new(HashMap::new()) })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn online(&self) -> usize {
        self.table.lock().len()
    }

    /// Capacity and name checks happen under the same lock as the insert.
    pub fn register(
        self: &Arc<Self>,
        name: &str,
        uuid: Uuid,
        sink: PlayerSink,
        relayed: bool,
    ) -> Result<Registration, LoginError> {
        let key = name.to_lowercase();
        let mut table = self.table.lock();

        if table.len() >= self.max {
            return Err(LoginError::ServerFull);
        }
        if table.contains_key(&key) {
            return Err(LoginError::AlreadyConnected);
        }

        table.insert(key.clone(), Entry { name: name.to_owned(), uuid, sink, relayed });
        Ok(Registration { players: self.clone(), key })
    }

    pub fn sample(&self, limit: usize) -> Vec<SamplePlayer> {
        self.table
            .lock()
            .values()
            .take(limit)
            .map(|entry| SamplePlayer { name: entry.name.clone(), id: entry.uuid })
            .collect()
    }

    /// Queues a keep alive for every player served locally. Relayed players are
    /// kept alive by their backend. Returns how many were sent.
    pub fn keep_alive(&self, id: i64) -> usize {
        self.table
            .lock()
            .values()
            .filter(|entry| !entry.relayed)
            .filter(|entry| entry.sink.send(KeepAlive { id }.into()).is_ok())
            .count()
    }

    fn update_uuid(&self, key: &str, uuid: Uuid) {
        if let Some(entry) = self.table.lock().get_mut(key) {
            entry.uuid = uuid;
        }
    }
}

/// A slot in [`Players`]. Dropping it frees the slot.
pub struct Registration {
    players: Arc<Players>,
    key: String,
}

impl Registration {
    /// Replaces the placeholder id once authentication settled the real one.
    pub fn set_uuid(&self, uuid: Uuid) {
        self.players.update_uuid(&self.key, uuid);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.players.table.lock().remove(&self.key);
    }
}

/// State shared by every connection, built once at startup.
pub struct Context {
    pub config: Config,
    pub registry: Arc<PacketRegistry>,
    pub encryption: EncryptionContext,
    pub auth: Arc<dyn AuthClient>,
    pub world: Arc<dyn World>,
    pub players: Arc<Players>,
    pub favicon: Option<String>,
}

impl Context {
    pub fn new(config: Config, auth: Arc<dyn AuthClient>, world: Arc<dyn World>) -> Result<Arc<Self>> {
        let favicon = config.favicon.as_deref().and_then(status::load_favicon);

        Ok(Arc::new(Self {
            registry: Arc::new(PacketRegistry::standard()?),
            encryption: EncryptionContext::generate()?,
            players: Players::new(config.max_players),
            auth,
            world,
            favicon,
            config,
        }))
    }

    pub fn is_proxy(&self) -> bool {
        self.config.proxy.is_some()
    }
}

pub async fn serve(listener: TcpListener, context: Arc<Context>) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    let period = Duration::from_secs(context.config.keep_alive_interval);
    let keep_alive = tokio::spawn(keep_alive(context.players.clone(), period));

    let result = accept_loop(&listener, &context).await;
    keep_alive.abort();
    result
}

async fn accept_loop(listener: &TcpListener, context: &Arc<Context>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let context = context.clone();

        tokio::spawn(async move {
            match handler::handle(stream, context).await {
                Ok(()) => debug!("{} closed", addr),
                Err(err) if is_closed(&err) => debug!("{} went away", addr),
                Err(err) => error!("{}: {:#}", addr, err),
            }
        });
    }
}

async fn keep_alive(players: Arc<Players>, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    interval.tick().await;

    let mut id: i64 = 0;
    loop {
        interval.tick().await;
        id = id.wrapping_add(1);

        let sent = players.keep_alive(id);
        if sent > 0 {
            debug!("keep alive {} sent to {} players", id, sent);
        }
    }
}
