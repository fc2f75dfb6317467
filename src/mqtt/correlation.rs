//! Matches inbound replies to the requests waiting for them
//!
//! Requests that expect a reply register a wait before their payload is published.
//! Each inbound payload resolves at most one wait: the oldest one whose expected
//! reply tag equals the payload's tag. Payloads that match no wait are dropped.
//!
//! ```text
//! register ──► [ wait 1 | wait 2 | wait 3 ]  (oldest first)
//!                  ▲
//! dispatch(tag) ───┘ first match resolved and removed
//! ```
//!
//! The pending counter tracks every outstanding request, including ones that only
//! wait for the publish to be acknowledged. It is maintained by [`PendingGuard`]s, so
//! each request decrements it exactly once however it ends.

use crate::error::FanError;
use crate::mqtt::message::{InboundPayload, ReplyKind};
use crate::mqtt::response::{DeviceStatus, SensorData};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub type WaitId = u64;

/// Result sender of a single wait; the variant fixes the reply it accepts
#[doc(hidden)]
pub enum Completion {
    Status(oneshot::Sender<Result<DeviceStatus, FanError>>),
    SensorData(oneshot::Sender<Result<SensorData, FanError>>),
}

impl Completion {
    fn expects(&self) -> ReplyKind {
        match self {
            Completion::Status(_) => ReplyKind::CurrentState,
            Completion::SensorData(_) => ReplyKind::EnvironmentalSensorData,
        }
    }

    /// Decodes the payload and hands the result over; returns whether decoding succeeded
    fn resolve(self, payload: &InboundPayload) -> bool {
        match self {
            Completion::Status(sender) => {
                let result = DeviceStatus::decode(payload).map_err(FanError::from);
                let decoded = result.is_ok();
                let _ = sender.send(result);
                decoded
            }
            Completion::SensorData(sender) => {
                let result = SensorData::decode(payload).map_err(FanError::from);
                let decoded = result.is_ok();
                let _ = sender.send(result);
                decoded
            }
        }
    }

    fn fail(self, error: FanError) {
        match self {
            Completion::Status(sender) => {
                let _ = sender.send(Err(error));
            }
            Completion::SensorData(sender) => {
                let _ = sender.send(Err(error));
            }
        }
    }
}

/// A reply type a request can wait for
pub trait Reply: Sized + Send + 'static {
    const KIND: ReplyKind;

    #[doc(hidden)]
    fn completion(sender: oneshot::Sender<Result<Self, FanError>>) -> Completion;
}

impl Reply for DeviceStatus {
    const KIND: ReplyKind = ReplyKind::CurrentState;

    fn completion(sender: oneshot::Sender<Result<Self, FanError>>) -> Completion {
        Completion::Status(sender)
    }
}

impl Reply for SensorData {
    const KIND: ReplyKind = ReplyKind::EnvironmentalSensorData;

    fn completion(sender: oneshot::Sender<Result<Self, FanError>>) -> Completion {
        Completion::SensorData(sender)
    }
}

/// Keeps one request counted as pending for as long as it is alive
#[derive(Debug)]
pub struct PendingGuard {
    counter: Arc<AtomicUsize>,
}

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PendingWait {
    id: WaitId,
    completion: Completion,
    guard: PendingGuard,
}

#[derive(Default)]
struct Waits {
    queue: VecDeque<PendingWait>,
    closed: bool,
}

/// What became of a dispatched payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A wait was resolved with the decoded reply
    Resolved,
    /// A wait matched but the reply could not be decoded; the wait was failed
    Failed,
    /// No wait expected this tag; the payload was dropped
    Unmatched,
    /// The payload was not a readable message
    Unparseable,
}

/// Registry of outstanding requests
#[derive(Default)]
pub struct Correlator {
    waits: Mutex<Waits>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Waits> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests whose lifecycle has not yet concluded
    pub fn pending_messages(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Number of waits still expecting a reply
    pub fn outstanding(&self) -> usize {
        self.lock().queue.len()
    }

    /// Counts a request as pending until the returned guard is dropped
    pub fn track(&self) -> PendingGuard {
        PendingGuard::new(&self.pending)
    }

    /// Registers a wait for a reply of type `T`
    ///
    /// Fails with [`FanError::Abandoned`] once the correlator has been closed.
    pub fn expect<T: Reply>(self: &Arc<Self>) -> Result<ReplyHandle<T>, FanError> {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut waits = self.lock();
            if waits.closed {
                return Err(FanError::Abandoned);
            }
            waits.queue.push_back(PendingWait {
                id,
                completion: T::completion(sender),
                guard: self.track(),
            });
        }
        debug!("Registered wait {} for {}", id, T::KIND.tag());

        Ok(ReplyHandle {
            receiver,
            registration: Some(Registration {
                correlator: Arc::downgrade(self),
                id,
            }),
        })
    }

    /// Parses a raw payload and resolves the oldest wait expecting its tag
    pub fn dispatch(&self, raw: &[u8]) -> Dispatch {
        match InboundPayload::parse(raw) {
            Ok(payload) => self.dispatch_payload(&payload),
            Err(e) => {
                warn!("Discarding unparseable payload: {}", e);
                Dispatch::Unparseable
            }
        }
    }

    pub fn dispatch_payload(&self, payload: &InboundPayload) -> Dispatch {
        let matched = {
            let mut waits = self.lock();
            waits
                .queue
                .iter()
                .position(|wait| wait.completion.expects().tag() == payload.tag())
                .and_then(|index| waits.queue.remove(index))
        };

        let Some(PendingWait {
            id,
            completion,
            guard,
        }) = matched
        else {
            debug!("No request waiting for {}, dropping payload", payload.tag());
            return Dispatch::Unmatched;
        };

        drop(guard);
        if completion.resolve(payload) {
            debug!("Resolved wait {} with {}", id, payload.tag());
            Dispatch::Resolved
        } else {
            warn!("Reply {} for wait {} could not be decoded", payload.tag(), id);
            Dispatch::Failed
        }
    }

    /// Fails a single wait; returns false if it was no longer registered
    pub fn fail(&self, id: WaitId, error: FanError) -> bool {
        match self.take(id) {
            Some(PendingWait {
                completion, guard, ..
            }) => {
                drop(guard);
                completion.fail(error);
                true
            }
            None => false,
        }
    }

    /// Withdraws a wait without resolving it
    pub fn cancel(&self, id: WaitId) -> bool {
        let cancelled = self.take(id).is_some();
        if cancelled {
            debug!("Wait {} cancelled", id);
        }
        cancelled
    }

    /// Fails every wait with [`FanError::Abandoned`] and refuses new ones
    ///
    /// Returns the number of waits that were abandoned.
    pub fn abandon_all(&self) -> usize {
        let abandoned: Vec<PendingWait> = {
            let mut waits = self.lock();
            waits.closed = true;
            waits.queue.drain(..).collect()
        };

        let count = abandoned.len();
        for PendingWait {
            completion, guard, ..
        } in abandoned
        {
            drop(guard);
            completion.fail(FanError::Abandoned);
        }
        count
    }

    fn take(&self, id: WaitId) -> Option<PendingWait> {
        let mut waits = self.lock();
        let index = waits.queue.iter().position(|wait| wait.id == id)?;
        waits.queue.remove(index)
    }
}

struct Registration {
    correlator: Weak<Correlator>,
    id: WaitId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(correlator) = self.correlator.upgrade() {
            correlator.cancel(self.id);
        }
    }
}

/// Completion handle of a request
///
/// Await it for the outcome. Dropping it before the outcome arrives withdraws the
/// request's wait, so a late reply is dropped like any unmatched payload.
#[must_use = "dropping a reply handle withdraws the request's wait"]
pub struct ReplyHandle<T> {
    receiver: oneshot::Receiver<Result<T, FanError>>,
    registration: Option<Registration>,
}

impl<T> Unpin for ReplyHandle<T> {}

impl<T> ReplyHandle<T> {
    /// A handle that is already resolved
    pub fn ready(result: Result<T, FanError>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(result);
        Self::from_receiver(receiver)
    }

    /// A handle resolved by whoever holds the sender
    pub fn from_receiver(receiver: oneshot::Receiver<Result<T, FanError>>) -> Self {
        Self {
            receiver,
            registration: None,
        }
    }

    pub(crate) fn wait_id(&self) -> Option<WaitId> {
        self.registration.as_ref().map(|registration| registration.id)
    }

    /// Waits for the outcome for at most `timeout`
    ///
    /// On expiry the wait is withdrawn and [`FanError::Timeout`] is returned.
    pub async fn with_timeout(self, timeout: Duration) -> Result<T, FanError> {
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(FanError::Timeout),
        }
    }
}

impl<T> Future for ReplyHandle<T> {
    type Output = Result<T, FanError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(result) => {
                // Resolved waits are already gone from the registry.
                if let Some(registration) = this.registration.as_mut() {
                    registration.correlator = Weak::new();
                }
                Poll::Ready(result.unwrap_or(Err(FanError::Abandoned)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for ReplyHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("wait_id", &self.wait_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &[u8] =
        br#"{"msg":"CURRENT-STATE","data":{"ercd":"02C0","wacd":"NONE","filf":"500"}}"#;
    const SENSORS: &[u8] = br#"{"msg":"ENVIRONMENTAL-CURRENT-SENSOR-DATA","data":{"tact":"OFF","hact":"40","pact":"1","vact":"INIT","sltm":"OFF"}}"#;

    #[tokio::test]
    async fn reply_resolves_matching_wait() {
        let correlator = Arc::new(Correlator::new());
        let handle = correlator.expect::<DeviceStatus>().unwrap();
        assert_eq!(correlator.pending_messages(), 1);

        assert_eq!(correlator.dispatch(STATUS), Dispatch::Resolved);
        let status = handle.await.unwrap();
        assert_eq!(status.remaining_filter_life(), 500);
        assert_eq!(correlator.pending_messages(), 0);
    }

    #[tokio::test]
    async fn unmatched_reply_leaves_waits_untouched() {
        let correlator = Arc::new(Correlator::new());
        let _handle = correlator.expect::<SensorData>().unwrap();

        assert_eq!(correlator.dispatch(STATUS), Dispatch::Unmatched);
        assert_eq!(correlator.outstanding(), 1);
        assert_eq!(correlator.pending_messages(), 1);
    }

    #[tokio::test]
    async fn undecodable_reply_fails_the_wait() {
        let correlator = Arc::new(Correlator::new());
        let handle = correlator.expect::<DeviceStatus>().unwrap();

        assert_eq!(
            correlator.dispatch(br#"{"msg":"CURRENT-STATE","data":{}}"#),
            Dispatch::Failed
        );
        assert!(matches!(handle.await, Err(FanError::DecodeError(_))));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn garbage_is_dropped() {
        let correlator = Arc::new(Correlator::new());
        let _handle = correlator.expect::<DeviceStatus>().unwrap();

        assert_eq!(correlator.dispatch(b"\x00\x01"), Dispatch::Unparseable);
        assert_eq!(correlator.outstanding(), 1);
    }

    #[tokio::test]
    async fn dropping_a_handle_withdraws_its_wait() {
        let correlator = Arc::new(Correlator::new());
        let handle = correlator.expect::<SensorData>().unwrap();
        assert_eq!(correlator.pending_messages(), 1);

        drop(handle);
        assert_eq!(correlator.outstanding(), 0);
        assert_eq!(correlator.pending_messages(), 0);
        assert_eq!(correlator.dispatch(SENSORS), Dispatch::Unmatched);
    }

    #[tokio::test]
    async fn fail_resolves_with_the_given_error() {
        let correlator = Arc::new(Correlator::new());
        let handle = correlator.expect::<DeviceStatus>().unwrap();
        let id = handle.wait_id().unwrap();

        assert!(correlator.fail(id, FanError::PublishError("refused".to_string())));
        assert!(!correlator.fail(id, FanError::Timeout));
        assert_eq!(
            handle.await,
            Err(FanError::PublishError("refused".to_string()))
        );
    }

    #[tokio::test]
    async fn abandon_all_fails_everything_and_closes() {
        let correlator = Arc::new(Correlator::new());
        let first = correlator.expect::<DeviceStatus>().unwrap();
        let second = correlator.expect::<SensorData>().unwrap();

        assert_eq!(correlator.abandon_all(), 2);
        assert_eq!(first.await, Err(FanError::Abandoned));
        assert_eq!(second.await, Err(FanError::Abandoned));
        assert_eq!(correlator.pending_messages(), 0);
        assert!(matches!(
            correlator.expect::<DeviceStatus>(),
            Err(FanError::Abandoned)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_withdraws_the_wait() {
        let correlator = Arc::new(Correlator::new());
        let handle = correlator.expect::<DeviceStatus>().unwrap();

        assert_eq!(
            handle.with_timeout(Duration::from_secs(1)).await,
            Err(FanError::Timeout)
        );
        assert_eq!(correlator.outstanding(), 0);
        assert_eq!(correlator.pending_messages(), 0);
    }

    #[tokio::test]
    async fn ready_handles_resolve_immediately() {
        let handle: ReplyHandle<()> = ReplyHandle::ready(Ok(()));
        assert_eq!(handle.await, Ok(()));
    }
}
