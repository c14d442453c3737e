use crate::state::coordinator::ScanCoordinator;
use crate::state::live_status::LiveStatusEnricher;
use crate::state::messages::{Query, Reply};
use anyhow::{Result, bail};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Websocket front for the read path: one JSON query per text frame, one
/// JSON reply per query.
pub struct QueryRelay {
    coordinator: ScanCoordinator,
    enricher: Arc<LiveStatusEnricher>,
    admin_token: Option<String>,
}

impl QueryRelay {
    pub fn new(
        coordinator: ScanCoordinator,
        enricher: Arc<LiveStatusEnricher>,
        admin_token: Option<String>,
    ) -> Self {
        Self { coordinator, enricher, admin_token }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("query relay listening on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = listener.accept().await?;
            let relay = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = relay.handle_client(stream).await {
                    warn!("client {peer} disconnected: {e}");
                }
            });
        }
    }

    async fn handle_client(&self, stream: TcpStream) -> Result<()> {
        let ws = accept_async(stream).await?;
        let (mut write, mut read) = ws.split();

        while let Some(inbound) = read.next().await {
            match inbound? {
                Message::Text(text) => {
                    let reply = self.answer(text.as_str()).await;
                    let body = serde_json::to_string(&reply)?;
                    write.send(Message::Text(body.into())).await?;
                }
                Message::Close(_) => break,
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(())
    }

    /// Answer one raw request. Failures become error replies.
    pub async fn answer(&self, text: &str) -> Reply {
        let query: Query = match serde_json::from_str(text) {
            Ok(query) => query,
            Err(e) => return Reply::error(format!("bad request: {e}")),
        };
        debug!("relay query: {query:?}");
        match self.dispatch(query).await {
            Ok(reply) => reply,
            Err(e) => Reply::error(format!("{e:#}")),
        }
    }

    async fn dispatch(&self, query: Query) -> Result<Reply> {
        let reply = match query {
            Query::Ranking { season } => {
                let season = match season {
                    Some(season) => season,
                    None => self.coordinator.catalog().await.current_season,
                };
                let mut view = self.coordinator.get_season(season).await?;
                self.enricher.annotate(&mut view.entries).await;
                Reply::Ranking(view)
            }
            Query::Catalog => Reply::Catalog(self.coordinator.catalog().await),
            Query::Live => Reply::Live { players: self.enricher.latest().await },
            Query::History { player } => {
                let points = self.coordinator.history(&player).await;
                Reply::History { player, points }
            }
            Query::Summary { player } => Reply::Summary(self.coordinator.player_summary(&player).await),
            Query::Rescan { season, token } => {
                match (&self.admin_token, token) {
                    (None, _) => bail!("rescan is disabled on this relay"),
                    (Some(expected), Some(given)) if *expected == given => {}
                    _ => bail!("rescan requires a valid admin token"),
                }
                let mut view = self.coordinator.force_rescan(season).await?;
                self.enricher.annotate(&mut view.entries).await;
                Reply::Ranking(view)
            }
        };
        Ok(reply)
    }
}
