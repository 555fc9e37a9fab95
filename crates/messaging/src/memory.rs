use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    BusError, DeadLetter, Delivery, DeliveryTag, Envelope, EnvelopeStream, MessageBus, MessageLog,
    MessageQuery, Result, bus::routing_matches,
};

#[derive(Debug, Clone)]
struct Pending {
    envelope: Envelope,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    bindings: Vec<String>,
    ready: VecDeque<Pending>,
    unacked: HashMap<DeliveryTag, Pending>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Debug, Default)]
struct BusState {
    queues: BTreeMap<String, QueueState>,
    published: Vec<Envelope>,
    next_tag: u64,
    fail_on_publish: bool,
}

/// In-memory broker for tests and single-process deployments.
///
/// Provides the same delivery semantics the services expect from the real
/// broker: fan-out by routing key, independent queues, redelivery of
/// unacknowledged messages and a dead-letter store per queue.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<RwLock<BusState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail with `Unavailable` until reset.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Every message published so far, in publish order.
    pub async fn published(&self) -> Vec<Envelope> {
        self.state.read().await.published.clone()
    }

    /// Published messages of one event type.
    pub async fn published_of_type(&self, event_type: &str) -> Vec<Envelope> {
        self.state
            .read()
            .await
            .published
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn queue_names(&self) -> Vec<String> {
        self.state.read().await.queues.keys().cloned().collect()
    }

    /// Number of messages waiting to be received on a queue.
    pub async fn ready_count(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }

    /// Number of messages handed out but not yet settled on a queue.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    pub async fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.state
            .read()
            .await
            .queues
            .get(queue)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Dead letters across every queue.
    pub async fn all_dead_letters(&self) -> Vec<DeadLetter> {
        self.state
            .read()
            .await
            .queues
            .values()
            .flat_map(|q| q.dead_letters.iter().cloned())
            .collect()
    }

    /// True when no queue has ready or unsettled messages.
    pub async fn is_idle(&self) -> bool {
        self.state
            .read()
            .await
            .queues
            .values()
            .all(|q| q.ready.is_empty() && q.unacked.is_empty())
    }

    /// Returns every unsettled delivery of a queue to the ready list, the way
    /// a broker does when a consumer connection drops.
    pub async fn recover(&self, queue: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;
        let recovered: Vec<Pending> = q.unacked.drain().map(|(_, p)| p).collect();
        let count = recovered.len();
        q.ready.extend(recovered);
        Ok(count)
    }

    /// Puts a copy of an already published message back on a queue, as a
    /// broker does for duplicate deliveries. The message keeps its id.
    pub async fn redeliver(&self, queue: &str, envelope: Envelope) -> Result<()> {
        let mut state = self.state.write().await;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;
        q.ready.push_back(Pending {
            envelope,
            delivery_count: 1,
        });
        Ok(())
    }

    async fn settle(&self, delivery: &Delivery) -> Result<(Pending, tokio::sync::RwLockWriteGuard<'_, BusState>)> {
        let mut state = self.state.write().await;
        let pending = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| BusError::UnknownQueue(delivery.queue.clone()))?
            .unacked
            .remove(&delivery.tag)
            .ok_or_else(|| BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag.value(),
            })?;
        Ok((pending, state))
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn declare_queue(&self, queue: &str, bindings: &[&str]) -> Result<()> {
        let mut state = self.state.write().await;
        let q = state.queues.entry(queue.to_string()).or_default();
        for binding in bindings {
            if !q.bindings.iter().any(|b| b == binding) {
                q.bindings.push(binding.to_string());
            }
        }
        tracing::debug!(queue, ?bindings, "queue declared");
        Ok(())
    }

    async fn publish_batch(&self, envelopes: Vec<Envelope>) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(BusError::Unavailable("broker rejected publish".to_string()));
        }

        for envelope in envelopes {
            for (name, queue) in state.queues.iter_mut() {
                if queue
                    .bindings
                    .iter()
                    .any(|b| routing_matches(b, &envelope.routing_key))
                {
                    tracing::trace!(queue = %name, message_id = %envelope.message_id, "routed");
                    queue.ready.push_back(Pending {
                        envelope: envelope.clone(),
                        delivery_count: 0,
                    });
                }
            }
            metrics::counter!("messages_published_total", "event_type" => envelope.event_type.clone())
                .increment(1);
            state.published.push(envelope);
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.write().await;
        state.next_tag += 1;
        let tag = DeliveryTag::new(state.next_tag);

        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;
        let Some(mut pending) = q.ready.pop_front() else {
            return Ok(None);
        };
        pending.delivery_count += 1;

        let delivery = Delivery {
            tag,
            queue: queue.to_string(),
            envelope: pending.envelope.clone(),
            delivery_count: pending.delivery_count,
        };
        q.unacked.insert(tag, pending);
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let (_acked, _state) = self.settle(delivery).await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let (pending, mut state) = self.settle(delivery).await?;
        if requeue && let Some(q) = state.queues.get_mut(&delivery.queue) {
            q.ready.push_back(pending);
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let (pending, mut state) = self.settle(delivery).await?;
        if let Some(q) = state.queues.get_mut(&delivery.queue) {
            q.dead_letters.push(DeadLetter {
                queue: delivery.queue.clone(),
                envelope: pending.envelope,
                reason: reason.to_string(),
                delivery_count: pending.delivery_count,
                dead_lettered_at: Utc::now(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLog for InMemoryBus {
    async fn query_published(&self, query: MessageQuery) -> Result<Vec<Envelope>> {
        let state = self.state.read().await;
        let matching = state
            .published
            .iter()
            .filter(|e| query.matches(e))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn stream_published(&self, from_position: usize) -> Result<EnvelopeStream> {
        use futures_util::stream;

        let state = self.state.read().await;
        let envelopes: Vec<Envelope> = state.published.iter().skip(from_position).cloned().collect();
        Ok(Box::pin(stream::iter(envelopes.into_iter().map(Ok))))
    }

    async fn published_count(&self) -> Result<usize> {
        Ok(self.state.read().await.published.len())
    }
}
