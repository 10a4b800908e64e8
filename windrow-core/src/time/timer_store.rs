use super::*;

/// The three clocks a timer can be registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeDomain {
    /// Driven by the input watermark.
    EventTime,
    /// Driven by the host's wall clock.
    ProcessingTime,
    /// Processing time that all upstream work has caught up to.
    SynchronizedProcessingTime,
}

impl std::fmt::Display for TimeDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeDomain::EventTime => write!(f, "event-time"),
            TimeDomain::ProcessingTime => write!(f, "processing-time"),
            TimeDomain::SynchronizedProcessingTime => write!(f, "synchronized-processing-time"),
        }
    }
}

/// Identity of a pending timer.
///
/// Setting a timer whose id already exists replaces the pending entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId {
    pub namespace: StateNamespace,
    pub timer_id: String,
    pub family: String,
    pub domain: TimeDomain,
}

impl TimerId {
    pub fn new(
        namespace: StateNamespace,
        timer_id: impl Into<String>,
        family: impl Into<String>,
        domain: TimeDomain,
    ) -> Self {
        Self {
            namespace,
            timer_id: timer_id.into(),
            family: family.into(),
            domain,
        }
    }
}

/// A pending timer: identity, fire instant, and the output-watermark hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerData {
    pub id: TimerId,
    pub fire_at: EventTime,
    pub output_timestamp: EventTime,
}

impl TimerData {
    pub fn new(id: TimerId, fire_at: EventTime, output_timestamp: EventTime) -> Self {
        Self {
            id,
            fire_at,
            output_timestamp,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TimerStoreSnapshot {
    timers: Vec<(u64, TimerData)>,
    seq: u64,
    input_watermark: EventTime,
    processing_time: EventTime,
    synchronized_processing_time: EventTime,
}

/// Pending timers for a single key, across all three time domains.
///
/// Each domain keeps an ordered queue keyed by `(fire_at, insertion sequence)`
/// with an auxiliary index by [`TimerId`] for replacement and cancellation.
/// A timer becomes eligible once its domain's clock has reached `fire_at`;
/// eligible timers pop in ascending `(fire_at, sequence)` order.
///
/// # Invariants
/// - All three clocks are monotonically non-decreasing; a regressing advance
///   fails with [`EngineError::InvalidWatermark`].
/// - A popped event timer always has `fire_at <= input_watermark`.
/// - Replacing a timer with an unchanged fire time keeps the original entry's
///   position in the queue.
#[derive(Debug, Clone)]
pub struct TimerStore {
    event: BTreeMap<(EventTime, u64), TimerData>,
    processing: BTreeMap<(EventTime, u64), TimerData>,
    synchronized: BTreeMap<(EventTime, u64), TimerData>,
    /// TimerId -> (fire_at, sequence) of the pending entry.
    index: AHashMap<TimerId, (EventTime, u64)>,
    seq: u64,
    input_watermark: EventTime,
    processing_time: EventTime,
    synchronized_processing_time: EventTime,
}

impl TimerStore {
    /// Create an empty store with all clocks at the minimum instant.
    pub fn new() -> Self {
        Self {
            event: BTreeMap::new(),
            processing: BTreeMap::new(),
            synchronized: BTreeMap::new(),
            index: AHashMap::new(),
            seq: 0,
            input_watermark: EVENT_TIME_MIN,
            processing_time: EVENT_TIME_MIN,
            synchronized_processing_time: EVENT_TIME_MIN,
        }
    }

    /// Register `timer`, superseding any pending timer with the same id.
    ///
    /// Setting the same id with an equal fire time is idempotent.
    pub fn set(&mut self, timer: TimerData) {
        let seq = match self.index.get(&timer.id).copied() {
            Some((fire_at, seq)) => {
                self.queue_mut(timer.id.domain).remove(&(fire_at, seq));
                if fire_at == timer.fire_at {
                    seq
                } else {
                    self.next_seq()
                }
            }
            None => self.next_seq(),
        };
        self.index.insert(timer.id.clone(), (timer.fire_at, seq));
        self.queue_mut(timer.id.domain)
            .insert((timer.fire_at, seq), timer);
    }

    /// Cancel the pending timer with this id. No-op if absent.
    pub fn delete(&mut self, id: &TimerId) {
        if let Some((fire_at, seq)) = self.index.remove(id) {
            self.queue_mut(id.domain).remove(&(fire_at, seq));
        }
    }

    /// Pop the earliest event timer with `fire_at <= input_watermark`.
    pub fn remove_next_event_timer(&mut self) -> Option<TimerData> {
        self.remove_next_in(TimeDomain::EventTime)
    }

    /// Pop the earliest processing timer with `fire_at <= processing_time`.
    pub fn remove_next_processing_timer(&mut self) -> Option<TimerData> {
        self.remove_next_in(TimeDomain::ProcessingTime)
    }

    /// Pop the earliest synchronized-processing timer that is due.
    pub fn remove_next_synchronized_processing_timer(&mut self) -> Option<TimerData> {
        self.remove_next_in(TimeDomain::SynchronizedProcessingTime)
    }

    fn remove_next_in(&mut self, domain: TimeDomain) -> Option<TimerData> {
        let clock = self.clock(domain);
        let queue = self.queue_mut(domain);
        let (&key, _) = queue.iter().next()?;
        if key.0 > clock {
            return None;
        }
        let timer = queue.remove(&key)?;
        self.index.remove(&timer.id);
        Some(timer)
    }

    /// Advance the input watermark. Requires `t >= current`.
    pub fn advance_input_watermark(&mut self, t: EventTime) -> Result<()> {
        Self::advance(TimeDomain::EventTime, &mut self.input_watermark, t)
    }

    /// Advance processing time. Requires `t >= current`.
    pub fn advance_processing_time(&mut self, t: EventTime) -> Result<()> {
        Self::advance(TimeDomain::ProcessingTime, &mut self.processing_time, t)
    }

    /// Advance synchronized processing time. Requires `t >= current`.
    pub fn advance_synchronized_processing_time(&mut self, t: EventTime) -> Result<()> {
        Self::advance(
            TimeDomain::SynchronizedProcessingTime,
            &mut self.synchronized_processing_time,
            t,
        )
    }

    fn advance(domain: TimeDomain, clock: &mut EventTime, t: EventTime) -> Result<()> {
        if t < *clock {
            return Err(EngineError::InvalidWatermark {
                domain,
                current: *clock,
                requested: t,
            }
            .into());
        }
        *clock = t;
        Ok(())
    }

    pub fn input_watermark(&self) -> EventTime {
        self.input_watermark
    }

    pub fn processing_time(&self) -> EventTime {
        self.processing_time
    }

    pub fn synchronized_processing_time(&self) -> EventTime {
        self.synchronized_processing_time
    }

    /// The earliest `output_timestamp` across all pending timers, if any.
    pub fn output_watermark_hold(&self) -> Option<EventTime> {
        self.event
            .values()
            .chain(self.processing.values())
            .chain(self.synchronized.values())
            .map(|t| t.output_timestamp)
            .min()
    }

    /// `min(input watermark, earliest pending output timestamp)`.
    ///
    /// Never ahead of the input watermark.
    pub fn output_watermark(&self) -> EventTime {
        match self.output_watermark_hold() {
            Some(hold) => hold.min(self.input_watermark),
            None => self.input_watermark,
        }
    }

    /// Fire time of the earliest pending timer in `domain`, or `None`.
    pub fn next_timer(&self, domain: TimeDomain) -> Option<EventTime> {
        self.queue(domain).keys().next().map(|&(t, _)| t)
    }

    /// All pending timers, in queue order per domain.
    pub fn pending(&self) -> impl Iterator<Item = &TimerData> {
        self.event
            .values()
            .chain(self.processing.values())
            .chain(self.synchronized.values())
    }

    /// Total count of pending timers across all domains.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Return `true` if no timers are pending in any domain.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Serialize pending timers and clocks.
    ///
    /// Entries are emitted in a stable order, so two snapshots with no
    /// mutation in between are byte-identical.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let mut timers: Vec<(u64, TimerData)> = Vec::with_capacity(self.index.len());
        for queue in [&self.event, &self.processing, &self.synchronized] {
            for (&(_, seq), timer) in queue {
                timers.push((seq, timer.clone()));
            }
        }
        let snapshot = TimerStoreSnapshot {
            timers,
            seq: self.seq,
            input_watermark: self.input_watermark,
            processing_time: self.processing_time,
            synchronized_processing_time: self.synchronized_processing_time,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Restore pending timers and clocks from a [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, data: &[u8]) -> Result<()> {
        let snapshot: TimerStoreSnapshot = bincode::deserialize(data)?;
        self.event.clear();
        self.processing.clear();
        self.synchronized.clear();
        self.index.clear();
        for (seq, timer) in snapshot.timers {
            self.index.insert(timer.id.clone(), (timer.fire_at, seq));
            self.queue_mut(timer.id.domain)
                .insert((timer.fire_at, seq), timer);
        }
        self.seq = snapshot.seq;
        self.input_watermark = snapshot.input_watermark;
        self.processing_time = snapshot.processing_time;
        self.synchronized_processing_time = snapshot.synchronized_processing_time;
        Ok(())
    }

    fn clock(&self, domain: TimeDomain) -> EventTime {
        match domain {
            TimeDomain::EventTime => self.input_watermark,
            TimeDomain::ProcessingTime => self.processing_time,
            TimeDomain::SynchronizedProcessingTime => self.synchronized_processing_time,
        }
    }

    fn queue(&self, domain: TimeDomain) -> &BTreeMap<(EventTime, u64), TimerData> {
        match domain {
            TimeDomain::EventTime => &self.event,
            TimeDomain::ProcessingTime => &self.processing,
            TimeDomain::SynchronizedProcessingTime => &self.synchronized,
        }
    }

    fn queue_mut(&mut self, domain: TimeDomain) -> &mut BTreeMap<(EventTime, u64), TimerData> {
        match domain {
            TimeDomain::EventTime => &mut self.event,
            TimeDomain::ProcessingTime => &mut self.processing,
            TimeDomain::SynchronizedProcessingTime => &mut self.synchronized,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

impl Default for TimerStore {
    fn default() -> Self {
        Self::new()
    }
}
