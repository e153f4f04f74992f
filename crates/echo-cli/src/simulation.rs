use anyhow::Context;
use serde::Serialize;
use tracing::info;

use echo_feed::{replicate, FeedDescriptor, FeedRole, FeedStore};
use echo_halo::Space;
use echo_pipeline::{
    Accumulator, AccumulatorMessage, ObjectMutation, Pipeline, PipelineConfig, Processor,
};
use echo_types::{FeedKey, KeyPair};

use crate::cli::Model;

#[derive(Clone, Debug, Serialize)]
pub struct PeerReport {
    pub peer: usize,
    pub feed: String,
    pub summary: String,
    pub digest: String,
    pub processed: u64,
    pub skipped: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub model: String,
    pub messages: u64,
    pub peers: Vec<PeerReport>,
    pub converged: bool,
}

impl SimulationReport {
    fn new(model: Model, messages: u64, peers: Vec<PeerReport>) -> Self {
        let converged = peers.windows(2).all(|w| w[0].digest == w[1].digest);
        Self {
            model: format!("{model:?}").to_lowercase(),
            messages,
            peers,
            converged,
        }
    }
}

/// Shape of a simulation run.
#[derive(Clone, Debug)]
pub struct Plan {
    pub peers: usize,
    pub messages: u32,
    pub sync_every: u32,
    pub config: PipelineConfig,
}

pub async fn simulate(model: Model, plan: &Plan) -> anyhow::Result<SimulationReport> {
    info!(?model, peers = plan.peers, messages = plan.messages, "simulation started");
    match model {
        Model::Accumulator => simulate_accumulator(plan),
        Model::Objects => simulate_objects(plan).await,
    }
}

struct AccumulatorPeer {
    store: FeedStore,
    pipeline: Pipeline,
    processor: Processor<Accumulator>,
}

impl AccumulatorPeer {
    fn feed_key(&self) -> anyhow::Result<FeedKey> {
        Ok(self.pipeline.writer()?.key())
    }
}

/// Peers alternate between adding and doubling, out of phase with each
/// other, so concurrent rounds do not commute.
fn accumulator_message(peer: usize, round: u32) -> AccumulatorMessage {
    let step = peer as u64 + u64::from(round);
    if step % 2 == 1 {
        AccumulatorMessage::multiply(2)
    } else {
        AccumulatorMessage::add(step as i64 + 1)
    }
}

fn simulate_accumulator(plan: &Plan) -> anyhow::Result<SimulationReport> {
    let mut peers = Vec::with_capacity(plan.peers);
    for _ in 0..plan.peers {
        let store = FeedStore::new();
        let mut pipeline = Pipeline::new(plan.config.clone())?;
        pipeline.set_writable_feed(store.create_writable(&KeyPair::generate())?, FeedRole::Writable)?;
        let processor = pipeline.processor(Accumulator::new());
        peers.push(AccumulatorPeer {
            store,
            pipeline,
            processor,
        });
    }

    let keys = peers
        .iter()
        .map(AccumulatorPeer::feed_key)
        .collect::<anyhow::Result<Vec<_>>>()?;
    for peer in &peers {
        for key in &keys {
            if !peer.pipeline.feed_set().contains(key)? {
                let replica = peer.store.open_replica(*key)?;
                peer.pipeline.add_feed(FeedDescriptor::readable(replica.readable()))?;
            }
        }
    }

    let sync = |peers: &mut Vec<AccumulatorPeer>| -> anyhow::Result<()> {
        for source in 0..peers.len() {
            let feed = peers[source].pipeline.writer()?.feed().readable();
            for (target, peer) in peers.iter().enumerate() {
                if target != source {
                    replicate(&feed, &peer.store.open_replica(feed.key())?)?;
                }
            }
        }
        for peer in peers.iter_mut() {
            peer.processor.drain()?;
        }
        Ok(())
    };

    for round in 0..plan.messages {
        for (index, peer) in peers.iter_mut().enumerate() {
            peer.pipeline.writer()?.write(&accumulator_message(index, round))?;
            peer.processor.drain()?;
        }
        if (round + 1) % plan.sync_every == 0 {
            sync(&mut peers)?;
        }
    }
    sync(&mut peers)?;

    let reports = peers
        .iter()
        .enumerate()
        .map(|(index, peer)| {
            let value = peer.processor.state().value();
            let stats = peer.processor.stats();
            Ok(PeerReport {
                peer: index,
                feed: peer.feed_key()?.short_id(),
                summary: format!("value = {value}"),
                digest: digest(&value.to_le_bytes()),
                processed: stats.processed,
                skipped: stats.skipped,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(SimulationReport::new(
        Model::Accumulator,
        u64::from(plan.messages) * plan.peers as u64,
        reports,
    ))
}

async fn sync_spaces(spaces: &mut [Space]) -> anyhow::Result<()> {
    for source in 0..spaces.len() {
        for target in 0..spaces.len() {
            if source != target {
                spaces[target].replicate_from(&spaces[source])?;
            }
        }
    }
    // Admission can open feeds that carry further admissions.
    for _ in 0..spaces.len() {
        for space in spaces.iter_mut() {
            space.run_until_idle().await?;
        }
    }
    Ok(())
}

async fn simulate_objects(plan: &Plan) -> anyhow::Result<SimulationReport> {
    let founder = Space::create(
        FeedStore::new(),
        plan.config.clone(),
        KeyPair::generate().public_key(),
    )
    .context("creating space")?;
    let invitation = founder.invitation();
    let mut spaces = vec![founder];

    for _ in 1..plan.peers {
        let joiner = Space::join(
            FeedStore::new(),
            plan.config.clone(),
            &invitation,
            KeyPair::generate().public_key(),
        )
        .context("joining space")?;
        spaces[0].replicate_from(&joiner)?;
        spaces[0].admit_member(joiner.identity_key(), joiner.feed_key()?)?;
        spaces.push(joiner);
    }
    sync_spaces(&mut spaces).await?;
    for (index, space) in spaces.iter().enumerate() {
        anyhow::ensure!(space.is_admitted()?, "peer {index} was not admitted");
        space.set_display_name(format!("peer-{index}"))?;
    }

    for round in 0..plan.messages {
        for (index, space) in spaces.iter_mut().enumerate() {
            // Each peer owns its property so concurrent writes commute.
            space.mutate(ObjectMutation::set(
                format!("card-{}", round % 4),
                format!("peer-{index}"),
                i64::from(round),
            ))?;
            space.process_pending()?;
        }
        if (round + 1) % plan.sync_every == 0 {
            sync_spaces(&mut spaces).await?;
        }
    }
    sync_spaces(&mut spaces).await?;

    let mut reports = Vec::with_capacity(spaces.len());
    for (index, space) in spaces.iter().enumerate() {
        let objects = space.objects().get_objects();
        let encoded = serde_json::to_vec(objects)?;
        let stats = space.stats();
        reports.push(PeerReport {
            peer: index,
            feed: space.feed_key()?.short_id(),
            summary: format!(
                "{} objects, {} members",
                objects.len(),
                space.halo().members().count()
            ),
            digest: digest(&encoded),
            processed: stats.processed,
            skipped: stats.skipped,
        });
    }
    Ok(SimulationReport::new(
        Model::Objects,
        u64::from(plan.messages) * plan.peers as u64,
        reports,
    ))
}

fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_pipeline::SelectorKind;

    fn plan(peers: usize, messages: u32, config: PipelineConfig) -> Plan {
        Plan {
            peers,
            messages,
            sync_every: 2,
            config,
        }
    }

    /// Causal order does not settle concurrent ADD and MULTIPLY: each peer
    /// applies its own write before the other's arrives.
    #[tokio::test]
    async fn accumulator_peers_diverge_on_concurrent_writes() {
        let plan = Plan {
            sync_every: 1,
            ..plan(2, 1, PipelineConfig::default())
        };
        let report = simulate(Model::Accumulator, &plan).await.unwrap();
        assert!(!report.converged);
        assert_eq!(report.peers[0].summary, "value = 2");
        assert_eq!(report.peers[1].summary, "value = 1");
    }

    #[tokio::test]
    async fn every_peer_applies_every_accumulator_message() {
        for selector in [SelectorKind::Timeframe, SelectorKind::FeedKey] {
            let config = PipelineConfig {
                selector,
                ..PipelineConfig::default()
            };
            let report = simulate(Model::Accumulator, &plan(3, 6, config)).await.unwrap();
            assert_eq!(report.messages, 18);
            assert!(report
                .peers
                .iter()
                .all(|p| p.processed == 18 && p.skipped == 0));
        }
    }

    #[tokio::test]
    async fn single_peer_is_trivially_converged() {
        let report = simulate(Model::Accumulator, &plan(1, 3, PipelineConfig::default()))
            .await
            .unwrap();
        assert!(report.converged);
        // add 1, double, add 3
        assert_eq!(report.peers[0].summary, "value = 5");
    }

    #[tokio::test]
    async fn object_spaces_converge() {
        let report = simulate(Model::Objects, &plan(3, 5, PipelineConfig::default()))
            .await
            .unwrap();
        assert!(report.converged);
        assert!(report.peers.iter().all(|p| p.summary == "4 objects, 3 members"));
        assert!(report.peers.iter().all(|p| p.skipped == 0));
    }
}
