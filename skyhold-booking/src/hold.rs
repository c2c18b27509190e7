use chrono::Duration;
use skyhold_catalog::{OccupancyView, SeatStatus};
use skyhold_core::{BookingError, BookingResult, Clock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

use crate::models::Hold;

#[derive(Debug, Clone)]
enum Slot {
    Free,
    Held(Hold),
    Sold { booking_id: Uuid },
}

/// Per-seat exclusive claims.
///
/// Each seat has its own mutex, so acquiring different seats never contends.
/// The outer map is only locked long enough to find or create a slot.
pub struct HoldManager {
    slots: RwLock<HashMap<Uuid, Arc<Mutex<Slot>>>>,
    clock: Arc<dyn Clock>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HoldManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn existing(&self, seat_id: Uuid) -> Option<Arc<Mutex<Slot>>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(&seat_id).cloned()
    }

    fn slot(&self, seat_id: Uuid) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.existing(seat_id) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(seat_id)
            .or_insert_with(|| Arc::new(Mutex::new(Slot::Free)))
            .clone()
    }

    /// Claim a seat for a booking. Fails if another live hold or a sale owns it.
    pub fn acquire(&self, seat_id: Uuid, booking_id: Uuid, ttl: Duration) -> BookingResult<Hold> {
        let slot = self.slot(seat_id);
        let mut guard = lock(&slot);
        let now = self.clock.now();

        match &*guard {
            Slot::Sold { .. } => Err(BookingError::SeatUnavailable(seat_id.to_string())),
            Slot::Held(hold) if hold.is_live(now) => Err(BookingError::SeatUnavailable(seat_id.to_string())),
            // Free, or a lapsed hold nobody has cleaned up yet
            _ => {
                let hold = Hold::new(seat_id, booking_id, now, ttl);
                *guard = Slot::Held(hold.clone());
                Ok(hold)
            }
        }
    }

    /// Free the seat if `hold_id` is still the current hold. Returns whether anything changed.
    pub fn release(&self, seat_id: Uuid, hold_id: Uuid) -> bool {
        let Some(slot) = self.existing(seat_id) else {
            return false;
        };
        let mut guard = lock(&slot);
        match &*guard {
            Slot::Held(hold) if hold.id == hold_id => {
                *guard = Slot::Free;
                true
            }
            _ => false,
        }
    }

    /// Keep a live hold alive past its deadline while a charge is in flight.
    pub fn pin(&self, seat_id: Uuid, hold_id: Uuid) -> bool {
        let Some(slot) = self.existing(seat_id) else {
            return false;
        };
        let mut guard = lock(&slot);
        let now = self.clock.now();
        match &mut *guard {
            Slot::Held(hold) if hold.id == hold_id && hold.is_live(now) => {
                hold.pinned = true;
                true
            }
            _ => false,
        }
    }

    /// Return a pinned hold to normal deadline rules.
    pub fn unpin(&self, seat_id: Uuid, hold_id: Uuid) -> bool {
        let Some(slot) = self.existing(seat_id) else {
            return false;
        };
        let mut guard = lock(&slot);
        match &mut *guard {
            Slot::Held(hold) if hold.id == hold_id => {
                hold.pinned = false;
                true
            }
            _ => false,
        }
    }

    /// Turn the hold into a permanent sale. Only valid for the current hold.
    pub fn convert_to_sale(&self, seat_id: Uuid, hold_id: Uuid) -> bool {
        let Some(slot) = self.existing(seat_id) else {
            return false;
        };
        let mut guard = lock(&slot);
        match &*guard {
            Slot::Held(hold) if hold.id == hold_id => {
                *guard = Slot::Sold { booking_id: hold.booking_id };
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, seat_id: Uuid) -> SeatStatus {
        let Some(slot) = self.existing(seat_id) else {
            return SeatStatus::Free;
        };
        let guard = lock(&slot);
        match &*guard {
            Slot::Free => SeatStatus::Free,
            Slot::Held(hold) if hold.is_live(self.clock.now()) => SeatStatus::Held,
            Slot::Held(_) => SeatStatus::Free,
            Slot::Sold { .. } => SeatStatus::Sold,
        }
    }

    /// The hold currently protecting a seat, if it is still live.
    pub fn live_hold(&self, seat_id: Uuid) -> Option<Hold> {
        let slot = self.existing(seat_id)?;
        let guard = lock(&slot);
        match &*guard {
            Slot::Held(hold) if hold.is_live(self.clock.now()) => Some(hold.clone()),
            _ => None,
        }
    }

    /// Booking that bought the seat, if sold
    pub fn sold_to(&self, seat_id: Uuid) -> Option<Uuid> {
        let slot = self.existing(seat_id)?;
        let guard = lock(&slot);
        match &*guard {
            Slot::Sold { booking_id } => Some(*booking_id),
            _ => None,
        }
    }
}

impl OccupancyView for HoldManager {
    fn seat_status(&self, seat_id: Uuid) -> SeatStatus {
        self.status(seat_id)
    }
}
