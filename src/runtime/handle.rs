use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};

use crate::{
    analysis::{self, ConsumptionReport},
    core::store::LedgerStore,
    error::LedgerError,
    op::StoredOp,
    operation::{Cursor, HopperOperation, OperationDraft, OperationFilter, QueryPage},
    persist::{OpSink, PersistError},
    types::{Channel, MachineId, OpSeq, OperationId},
};

use super::events::LedgerEvent;

/// Failure surfaced by the ledger service.
#[derive(Debug)]
pub enum RuntimeError {
    /// Validation or lookup failure; never retried.
    Ledger(LedgerError),
    /// Transient persistence failure. The rejected command left no state
    /// change, so callers may back off and retry it verbatim.
    StorageUnavailable(PersistError),
    /// The service loop is gone.
    ChannelClosed,
}

impl From<LedgerError> for RuntimeError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<PersistError> for RuntimeError {
    fn from(value: PersistError) -> Self {
        Self::StorageUnavailable(value)
    }
}

/// Persistence and checkpoint policy for the service loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Flush the journal batch as soon as it contains a new record.
    pub flush_on_submit: bool,
    /// Flush when this many ops are buffered.
    pub batch_max_ops: usize,
    /// Flush buffered ops after this long regardless of count.
    pub batch_max_latency_ms: u64,
    /// Bound on the persistence queue; overflow surfaces as an error.
    pub persist_queue_bound: usize,
    /// Auto-checkpoint after this many accepted records; 0 disables.
    pub snapshot_every_ops: usize,
    /// Compact the journal after each snapshot.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_submit: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Cloneable async handle to the ledger service loop.
pub struct LedgerHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<LedgerEvent>,
}

impl Clone for LedgerHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Submit {
        draft: OperationDraft,
        resp: oneshot::Sender<Result<OperationId, RuntimeError>>,
    },
    Acknowledge {
        id: OperationId,
        channel: Channel,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Get {
        id: OperationId,
        resp: oneshot::Sender<Result<HopperOperation, RuntimeError>>,
    },
    Query {
        filter: OperationFilter,
        resp: oneshot::Sender<Vec<HopperOperation>>,
    },
    Page {
        filter: OperationFilter,
        cursor: Option<Cursor>,
        limit: usize,
        resp: oneshot::Sender<QueryPage>,
    },
    Analyze {
        machine_id: MachineId,
        period_days: u32,
        resp: oneshot::Sender<Result<ConsumptionReport, RuntimeError>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: crate::core::store::StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Spawns the single-writer service loop over `store`.
///
/// All submissions and acknowledgments are serialized through one command
/// channel, which is what guarantees unique monotonic ids and ordered
/// timestamps under concurrent callers. Reads run through the same loop
/// and therefore observe a consistent snapshot per call.
pub fn spawn_ledger(
    store: LedgerStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> LedgerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<LedgerEvent>(1024);

    let (persist_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        let mut ops_since_snapshot = 0usize;

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut store,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            &mut ops_since_snapshot,
                        ).await;

                        if done {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        if let Some(Ok(op_seq)) = durable {
                            let _ = events_tx_loop.send(LedgerEvent::DurableUpTo { op_seq });
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut store,
                    &events_tx_loop,
                    persist_tx_opt.as_ref(),
                    &config,
                    &mut ops_since_snapshot,
                ).await;
                if done {
                    break;
                }
            }
        }
    });

    LedgerHandle { cmd_tx, events_tx }
}

impl LedgerHandle {
    /// Subscribes to the service event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events_tx.subscribe()
    }

    /// Validates and records a new operation.
    pub async fn submit(&self, draft: OperationDraft) -> Result<OperationId, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Submit { draft, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Marks `channel` acknowledged for `id`; returns whether the record is
    /// now fully synced.
    pub async fn acknowledge(
        &self,
        id: OperationId,
        channel: Channel,
    ) -> Result<bool, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Acknowledge {
                id,
                channel,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Fetches one record; `NotFound` for unknown ids.
    pub async fn get(&self, id: OperationId) -> Result<HopperOperation, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// All records matching `filter`, ordered by `(created_at_ms, id)`.
    pub async fn query(&self, filter: OperationFilter) -> Result<Vec<HopperOperation>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Query { filter, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// One page of matches after `cursor`.
    pub async fn page(
        &self,
        filter: OperationFilter,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<QueryPage, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Page {
                filter,
                cursor,
                limit,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Consumption report for a machine over a trailing window.
    pub async fn analyze(
        &self,
        machine_id: MachineId,
        period_days: u32,
    ) -> Result<ConsumptionReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Analyze {
                machine_id,
                period_days,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Forces the journal to durability; returns the durable sequence.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes a snapshot now.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Flushes persistence and stops the service loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut LedgerStore,
    events_tx: &broadcast::Sender<LedgerEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) -> bool {
    match cmd {
        Command::Submit { draft, resp } => {
            // Journal capacity is reserved before the store mutates: a
            // full persistence queue rejects the command with the store
            // untouched, so a retried submit never leaves an accepted
            // record without its journal op.
            let res = match reserve_persist(persist_tx) {
                Ok(permit) => store
                    .submit(draft)
                    .map_err(RuntimeError::from)
                    .map(|(id, _)| {
                        persist_queued(&mut *store, permit, events_tx);
                        let _ = events_tx.send(LedgerEvent::Recorded { id });
                        id
                    }),
                Err(err) => Err(err),
            };
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
            let _ = resp.send(res);
        }
        Command::Acknowledge { id, channel, resp } => {
            let res = match reserve_persist(persist_tx) {
                Ok(permit) => store
                    .acknowledge(id, channel)
                    .map_err(RuntimeError::from)
                    .map(|(fully, stored)| {
                        // A repeated acknowledgment changed nothing and
                        // queued no op; the unused permit just lapses.
                        if stored.is_some() {
                            persist_queued(&mut *store, permit, events_tx);
                            let _ = events_tx.send(LedgerEvent::Acknowledged { id, channel });
                            if fully {
                                let _ = events_tx.send(LedgerEvent::FullySynced { id });
                            }
                        }
                        fully
                    }),
                Err(err) => Err(err),
            };
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let res = store
                .get_cloned(id)
                .ok_or(RuntimeError::Ledger(LedgerError::NotFound(id)));
            let _ = resp.send(res);
        }
        Command::Query { filter, resp } => {
            let _ = resp.send(store.query_cloned(&filter));
        }
        Command::Page {
            filter,
            cursor,
            limit,
            resp,
        } => {
            let _ = resp.send(store.page(&filter, cursor, limit));
        }
        Command::Analyze {
            machine_id,
            period_days,
            resp,
        } => {
            let res = analysis::analyze(store, machine_id, period_days, now_ms())
                .map_err(RuntimeError::from);
            let _ = resp.send(res);
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx.send(PersistMsg::Flush { resp: flush_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = persist_tx {
                let snapshot = store.export_snapshot();
                let last_seq = store.latest_op_seq();
                let (cp_tx, cp_rx) = oneshot::channel();
                if tx
                    .send(PersistMsg::Checkpoint {
                        snapshot,
                        last_seq,
                        compact: config.compact_after_snapshot,
                        resp: cp_tx,
                    })
                    .await
                    .is_err()
                {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    cp_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                let send_res = tx.send(PersistMsg::Shutdown { resp: done_tx }).await;
                if send_res.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    match done_rx.await {
                        Ok(()) => Ok(()),
                        Err(_) => Err(RuntimeError::ChannelClosed),
                    }
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    config: RuntimeConfig,
) {
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let mut last_durable: OpSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Op(stored) => {
                            let is_record = matches!(stored.op, crate::op::Op::Record { .. });
                            buf.push(stored);

                            if buf.len() >= config.batch_max_ops || (config.flush_on_submit && is_record) {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                                deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let flush_result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let result = if let Err(err) = flush_result {
                                Err(err)
                            } else {
                                let sink_ref = Arc::clone(&sink);
                                match tokio::task::spawn_blocking(move || {
                                    let mut sink = sink_ref.blocking_lock();
                                    sink.write_snapshot(&snapshot, last_seq)?;
                                    if compact {
                                        let _ = sink.compact_through(last_seq)?;
                                    }
                                    Result::<(), PersistError>::Ok(())
                                }).await {
                                    Ok(inner) => inner,
                                    Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                                }
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, false).await;
                    deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                }
            }
        }
    });
}

async fn flush_buf(
    sink: &Arc<Mutex<Box<dyn OpSink>>>,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    call_flush: bool,
) -> Result<(), PersistError> {
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.flush()
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let ops = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let append_res: Result<OpSeq, PersistError> = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let seq = sink.append_ops(&ops)?;
        if call_flush {
            sink.flush()?;
        }
        Ok(seq)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    match append_res {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            let _ = durable_tx.send(Ok(*last_durable));
            Ok(())
        }
        Err(err) => {
            let _ = durable_tx.send(Err(PersistError::Message(format!("append failed: {err:?}"))));
            Err(err)
        }
    }
}

async fn maybe_auto_checkpoint(
    store: &LedgerStore,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) {
    if config.snapshot_every_ops == 0 || *ops_since_snapshot < config.snapshot_every_ops {
        return;
    }

    let Some(tx) = persist_tx else {
        return;
    };

    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    let (cp_tx, cp_rx) = oneshot::channel();
    if tx
        .send(PersistMsg::Checkpoint {
            snapshot,
            last_seq,
            compact: config.compact_after_snapshot,
            resp: cp_tx,
        })
        .await
        .is_ok()
    {
        let _ = cp_rx.await;
        *ops_since_snapshot = 0;
    }
}

fn reserve_persist<'a>(
    tx: Option<&'a mpsc::Sender<PersistMsg>>,
) -> Result<Option<mpsc::Permit<'a, PersistMsg>>, RuntimeError> {
    match tx {
        Some(tx) => match tx.try_reserve() {
            Ok(permit) => Ok(Some(permit)),
            Err(err) => Err(RuntimeError::StorageUnavailable(PersistError::Message(
                format!("persist queue error: {err}"),
            ))),
        },
        None => Ok(None),
    }
}

/// Hands the op queued by the last accepted mutation to persistence.
///
/// The service loop drains after every accepted command, so at most one
/// op is queued here and the reserved permit always suffices.
fn persist_queued(
    store: &mut LedgerStore,
    permit: Option<mpsc::Permit<'_, PersistMsg>>,
    events_tx: &broadcast::Sender<LedgerEvent>,
) {
    let mut queued = store.drain_pending_ops();
    match permit {
        Some(permit) => {
            if let Some(op) = queued.pop() {
                permit.send(PersistMsg::Op(op));
            }
        }
        None => {
            let _ = events_tx.send(LedgerEvent::DurableUpTo {
                op_seq: store.latest_op_seq(),
            });
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
