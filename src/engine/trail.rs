//! Trail: undo log for destructive heap updates.
//!
//! Guest code that overwrites a heap cell it may need back on backtracking
//! records the old value with [`Engine::trail_assign`]. A [`Ticket`] marks a
//! point in the trail; resetting to a ticket either restores every value
//! recorded since (undo, exception, retry) or just forgets them (commit,
//! solve).

use std::sync::Arc;

use tracing::trace;

use crate::config::EngineConfig;
use crate::memory::{Zone, ZoneAllocator, ZoneError, ZoneRequest};

use super::types::{fatal, Word};
use super::Engine;

/// One recorded assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrailEntry {
    pub addr: Word,
    pub old_value: Word,
}

/// A saved trail position plus the ticket counter value at the time it was
/// taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub trail_ptr: Word,
    pub counter: usize,
}

/// Why the trail is being reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrailReason {
    /// Backtracking into an earlier alternative
    Undo,
    /// Committing to the current solution
    Commit,
    /// An exception is unwinding to its handler
    Exception,
    /// The debugger is retrying a call
    Retry,
    /// All solutions of a goal have been collected
    Solve,
}

impl UntrailReason {
    /// Whether this reason restores recorded values or merely drops them.
    pub fn restores_values(self) -> bool {
        matches!(self, Self::Undo | Self::Exception | Self::Retry)
    }
}

#[derive(Debug)]
pub struct Trail {
    zone: Zone<TrailEntry>,
    ptr: Word,
    ticket_counter: usize,
    ticket_high_water: usize,
}

impl Trail {
    pub(crate) fn create(
        config: &EngineConfig,
        allocator: &Arc<dyn ZoneAllocator>,
    ) -> Result<Self, ZoneError> {
        let request = ZoneRequest::new("trail", config.trail_size, config.trail_redzone)
            .with_alignment(config.zone_alignment);
        let zone = Zone::create(allocator, &request)?;
        let ptr = zone.base();
        Ok(Self {
            zone,
            ptr,
            ticket_counter: 0,
            ticket_high_water: 0,
        })
    }

    /// Next free trail slot.
    pub fn ptr(&self) -> Word {
        self.ptr
    }

    pub fn base(&self) -> Word {
        self.zone.base()
    }

    /// Number of entries currently recorded.
    pub fn len(&self) -> usize {
        self.ptr - self.zone.base()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ticket_counter(&self) -> usize {
        self.ticket_counter
    }

    pub fn ticket_high_water(&self) -> usize {
        self.ticket_high_water
    }

    fn push(&mut self, entry: TrailEntry) {
        self.zone.set(self.ptr, entry);
        self.ptr += 1;
    }

    fn store_ticket(&mut self) -> Ticket {
        let ticket = Ticket {
            trail_ptr: self.ptr,
            counter: self.ticket_counter,
        };
        self.ticket_counter += 1;
        self.ticket_high_water = self.ticket_counter;
        ticket
    }

    fn pop_ticket(&mut self, what: &str) {
        match self.ticket_counter.checked_sub(1) {
            Some(counter) => self.ticket_counter = counter,
            None => fatal(format_args!("{} with no outstanding ticket", what)),
        }
    }

    /// Drop recorded entries above `mark`, writing the old values back into
    /// `heap` first when `reason` asks for it. Entries are undone newest
    /// first so that a cell assigned twice ends up with its oldest value.
    fn untrail_to(&mut self, mark: Word, reason: UntrailReason, heap: &mut Zone<Word>) {
        if mark > self.ptr {
            fatal(format_args!(
                "trail reset to {:#x} above trail pointer {:#x}",
                mark, self.ptr
            ));
        }
        if reason.restores_values() {
            for slot in (mark..self.ptr).rev() {
                let entry = *self.zone.get(slot);
                heap.set(entry.addr, entry.old_value);
            }
        }
        self.ptr = mark;
    }
}

impl Engine {
    /// The current context's trail.
    pub fn trail(&self) -> &Trail {
        &self.context.trail
    }

    /// Assign a heap cell, recording its old value on the trail.
    pub fn trail_assign(&mut self, addr: Word, value: Word) {
        let old_value = *self.heap.get(addr);
        self.context.trail.push(TrailEntry { addr, old_value });
        self.heap.set(addr, value);
    }

    /// Mark the current trail position.
    pub fn store_ticket(&mut self) -> Ticket {
        self.context.trail.store_ticket()
    }

    /// Return the trail to the position saved in `ticket`.
    pub fn reset_ticket(&mut self, ticket: Ticket, reason: UntrailReason) {
        trace!(
            target: "nondet_vm::trail",
            from = self.context.trail.ptr,
            to = ticket.trail_ptr,
            ?reason,
            "reset ticket"
        );
        self.context
            .trail
            .untrail_to(ticket.trail_ptr, reason, &mut self.heap);
    }

    /// Release the most recent ticket without touching the high-water mark.
    pub fn prune_ticket(&mut self) {
        self.context.trail.pop_ticket("prune_ticket");
    }

    /// Release the most recent ticket and lower the high-water mark with it.
    pub fn discard_ticket(&mut self) {
        let trail = &mut self.context.trail;
        trail.pop_ticket("discard_ticket");
        trail.ticket_high_water = trail.ticket_counter;
    }

    /// Release every ticket taken after `ticket`, and `ticket` itself.
    pub fn prune_tickets_to(&mut self, ticket: Ticket) {
        let trail = &mut self.context.trail;
        if ticket.counter > trail.ticket_counter {
            fatal(format_args!(
                "prune to ticket {} above counter {}",
                ticket.counter, trail.ticket_counter
            ));
        }
        trail.ticket_counter = ticket.counter;
    }
}
