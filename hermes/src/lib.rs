//! Process entry point (spec §2, "Glue"): loads a `HermesConfig`, boots a
//! Broker, spawns its local Nodes and Storage engine, runs the Broker to
//! completion, and reports the final outcome.

pub mod drivers;
pub mod glue;

use hermes_admin::{init_logging, HermesConfig};
use hermes_base::{err_kind, ErrorKind};
use hermes_broker::{Broker, BrokerOutcome};
use hermes_proto::{GlobalNodeId, NodeId};
use hermes_transport::{CoordinationClient, Endpoint};
use tokio_util::sync::CancellationToken;

/// Run one session to completion. `control_endpoint` is this host's
/// coordination socket address; Nodes and peer Brokers connect to it. The
/// data-plane (PUB/SUB) socket binds on the next port up, by convention.
/// Equivalent to [`run_with_cancel`] with a token nothing outside this
/// process can reach; a peer `DRAIN` broadcast or a storage overflow are
/// still enough to end the session.
pub async fn run(config: HermesConfig, control_endpoint: Endpoint) -> BrokerOutcome {
    run_with_cancel(config, control_endpoint, CancellationToken::new()).await
}

/// As [`run`], but `cancel` is supplied by the caller so an operator-stop
/// or duration-expiry trigger (spec §4.1's `DRAIN` entry conditions) can
/// end the session from outside the FSM loop.
pub async fn run_with_cancel(config: HermesConfig, control_endpoint: Endpoint, cancel: CancellationToken) -> BrokerOutcome {
    init_logging();

    let data_endpoint = Endpoint::new(control_endpoint.host.clone(), control_endpoint.port + 1);
    let mut broker = match Broker::boot(config, control_endpoint.clone(), data_endpoint, cancel).await {
        Ok(broker) => broker,
        Err(e) => return BrokerOutcome::from_error(&e),
    };

    let bus = broker.proxy().local_bus().clone();
    let self_broker_id = broker.self_id().clone();
    let config = broker.config().clone();
    let cancel = broker.cancellation();
    let clock = broker.clock();
    let session_start = broker.take_session_start();

    let nodes = match glue::spawn_nodes(&config, &self_broker_id, &control_endpoint, &bus, &clock).await {
        Ok(nodes) => nodes,
        Err(e) => return BrokerOutcome::from_error(&e),
    };

    let keyboard = hermes_input::KeyboardHub::spawn(64);
    let keyboard_republish = tokio::spawn(spawn_keyboard_republish(
        control_endpoint.clone(),
        self_broker_id.clone(),
        keyboard.subscribe(),
    ));

    // Phase one of storage start-up doesn't need the real session-start
    // timestamp, only the bus (spec §4.3): begin buffering every stream in
    // memory now, so nothing is lost while the Broker is still in
    // DISCOVER/SYNC/READY.
    let ingest = glue::spawn_stream_ingest(&config, &bus, cancel.clone());
    let overflow = ingest.overflow.clone();

    let mut broker_task = tokio::spawn(broker.run());

    let storage = tokio::select! {
        started_at_reference_ns = session_start => {
            let started_at_reference_ns = started_at_reference_ns.unwrap_or(0);
            let session_id = uuid::Uuid::new_v4().to_string();
            match glue::spawn_flush_scheduler(
                &config, &self_broker_id, session_id, started_at_reference_ns, ingest, cancel.clone(),
            ).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    cancel.cancel();
                    let _ = broker_task.await;
                    return BrokerOutcome::from_error(&e);
                }
            }
        }
        outcome = &mut broker_task => {
            // The Broker reached a terminal state (e.g. FAILED during
            // DISCOVER/SYNC) before ever entering RUN, so there is no real
            // timestamp and no session to persist.
            let outcome = outcome.unwrap_or_else(|_| {
                BrokerOutcome::from_error(&err_kind(ErrorKind::Fatal, "broker task panicked"))
            });
            cancel.cancel();
            for handle in nodes.handles {
                let _ = handle.await;
            }
            keyboard.post_shutdown();
            let _ = keyboard_republish.await;
            for handle in ingest.ingest_handles {
                let _ = handle.await;
            }
            return overridden_by_overflow(outcome, &overflow);
        }
    };

    let outcome = broker_task.await.unwrap_or_else(|_| {
        BrokerOutcome::from_error(&err_kind(ErrorKind::Fatal, "broker task panicked"))
    });

    keyboard.post_shutdown();
    cancel.cancel();
    for handle in nodes.handles {
        let _ = handle.await;
    }
    let _ = keyboard_republish.await;
    if let Some(storage) = storage {
        let _ = storage.await;
    }

    overridden_by_overflow(outcome, &overflow)
}

/// A ring overflow reaches the Broker only as a cancelled token, indistinguishable
/// from an operator stop, so the true cause has to be recovered here to report the
/// distinct exit code spec §6 assigns it (4, vs. a clean stop's 0).
fn overridden_by_overflow(
    outcome: BrokerOutcome,
    overflow: &std::sync::Arc<std::sync::Mutex<Option<hermes_base::Error>>>,
) -> BrokerOutcome {
    match overflow.lock().expect("overflow mutex poisoned").take() {
        Some(e) => BrokerOutcome::from_error(&e),
        None => outcome,
    }
}

/// Re-publish every keyboard line as a control-plane `Msg` to this host's
/// own Broker (spec §4.5: "re-publishing ... to every process-isolated
/// Node's coordination socket" — the control socket is that mechanism
/// regardless of whether a Node happens to share this process). The
/// Broker's `do_run` fans each line back out to its local Nodes.
async fn spawn_keyboard_republish(
    control_endpoint: Endpoint,
    self_broker_id: hermes_proto::BrokerId,
    subscription: hermes_input::KeyboardSubscription,
) {
    let control = match CoordinationClient::connect(&control_endpoint).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(target: "hermes::glue", error = %e, "keyboard republisher could not connect to broker");
            return;
        }
    };
    let sender_id = GlobalNodeId {
        broker_id: self_broker_id,
        node_id: NodeId::from("keyboard"),
    };
    if let Err(e) = hermes_input::republish_to_control(subscription, control, sender_id).await {
        tracing::warn!(target: "hermes::glue", error = %e, "keyboard republisher ended with error");
    }
}
