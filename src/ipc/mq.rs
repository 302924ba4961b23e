//! Message queue
//!
//! Bounded queues of prioritized messages. Receivers get the highest
//! priority message first, equal priorities in FIFO order.
//!
//! # Interruptions
//!
//! [`MessageQueue::send`] and [`MessageQueue::receive`] return
//! [`OsalError::Interrupted`] when a signal handler runs while they block.
//! [`MessageQueue::timedsend`] and [`MessageQueue::timedreceive`] resume
//! waiting until their deadline instead.

use crate::config::MQ_NAME_MAX;
use crate::error::{OsalError, OsalResult};
use crate::port::{self, MessageQueueBackend, MqStatus};
use crate::time::Timer;
use crate::types::{MqAttr, MsgPrio};

use super::host_name;

/// Open message queue
#[derive(Debug)]
pub struct MessageQueue {
    raw: port::MessageQueue,
    name: String,
    max_message_size: usize,
}

impl MessageQueue {
    /// Open or create the queue `name`
    ///
    /// `attr.max_messages` and `attr.max_message_size` apply only when the
    /// queue is created; an existing queue keeps its geometry.
    ///
    /// # Returns
    /// * `Err(OsalError::InvalidParam)` - Malformed name or geometry
    /// * `Err(OsalError::PermissionDenied)` - Access denied or exclusive
    ///   create of an existing queue
    /// * `Err(OsalError::SystemLimitReached)` - Descriptor or queue limit
    /// * `Err(OsalError::NotFound)` - Queue missing and `CREAT` not set
    pub fn open(name: &str, attr: &MqAttr) -> OsalResult<Self> {
        let host = host_name(name, MQ_NAME_MAX)?;
        let raw = port::MessageQueue::open(&host, attr)?;
        let max_message_size = raw.status()?.max_message_size;

        crate::debug!("mq {} open, message size {}", name, max_message_size);
        Ok(MessageQueue {
            raw,
            name: name.to_owned(),
            max_message_size,
        })
    }

    fn check_len(&self, len: usize) -> OsalResult<()> {
        if len > self.max_message_size {
            return Err(OsalError::InvalidParam);
        }
        Ok(())
    }

    /// Enqueue `msg`, blocking while the queue is full
    ///
    /// # Returns
    /// * `Err(OsalError::InvalidParam)` - `msg` exceeds the message size
    /// * `Err(OsalError::Busy)` - Full non-blocking queue
    /// * `Err(OsalError::Interrupted)` - A signal arrived while blocked
    pub fn send(&self, msg: &[u8], prio: MsgPrio) -> OsalResult<()> {
        self.check_len(msg.len())?;
        self.raw.send(msg, prio)
    }

    /// Enqueue `msg`, giving up at `deadline`
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - Queue stayed full until the deadline
    pub fn timedsend(&self, msg: &[u8], prio: MsgPrio, deadline: &Timer) -> OsalResult<()> {
        self.check_len(msg.len())?;
        self.raw.timedsend(msg, prio, deadline)
    }

    /// Dequeue the oldest highest priority message into `buf`
    ///
    /// `buf` must hold at least the queue's message size.
    ///
    /// # Returns
    /// * `Ok((len, prio))` - Length of the message and its priority
    /// * `Err(OsalError::InvalidParam)` - `buf` smaller than the message size
    /// * `Err(OsalError::Busy)` - Empty non-blocking queue
    /// * `Err(OsalError::Interrupted)` - A signal arrived while blocked
    pub fn receive(&self, buf: &mut [u8]) -> OsalResult<(usize, MsgPrio)> {
        self.raw.receive(buf)
    }

    /// Dequeue a message, giving up at `deadline`
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - Queue stayed empty until the deadline
    pub fn timedreceive(&self, buf: &mut [u8], deadline: &Timer) -> OsalResult<(usize, MsgPrio)> {
        self.raw.timedreceive(buf, deadline)
    }

    /// Geometry and current depth
    pub fn attr(&self) -> OsalResult<MqStatus> {
        self.raw.status()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Close this descriptor; the queue itself stays until unlinked
    pub fn close(self) -> OsalResult<()> {
        self.raw.close()
    }

    /// Remove the queue `name` from the system
    ///
    /// Open descriptors keep working until closed.
    pub fn unlink(name: &str) -> OsalResult<()> {
        let host = host_name(name, MQ_NAME_MAX)?;
        port::MessageQueue::unlink(&host)
    }
}
