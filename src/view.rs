//! View-state for inventory screens: the current filter selection, the last
//! accepted record set and the option lists derived from it.
//!
//! Refreshes are tagged with a [`Ticket`]; a response is applied only if its
//! ticket is the latest one issued, so late answers to superseded requests
//! are dropped. Destructive operations call [`InventoryView::invalidate`]
//! and the next read refetches.

use log::debug;

use crate::{
    error::InventoryError,
    filter::{InventoryFilters, apply_filters, choice},
    model::{DatabaseRecord, Provider},
    options::{FilterOptions, filter_options, validate_region},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct RequestSequencer {
    issued: u64,
    applied: Option<u64>,
}

impl RequestSequencer {
    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    /// Whether a response for `ticket` should be applied. Only the most
    /// recently issued ticket is accepted, and only once.
    pub fn accept(&mut self, ticket: Ticket) -> bool {
        if ticket.0 != self.issued || self.applied == Some(ticket.0) {
            debug!("Discarding stale response #{} (latest #{})", ticket.0, self.issued);
            return false;
        }
        self.applied = Some(ticket.0);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.applied == Some(self.issued)
    }
}

#[derive(Debug, Default)]
pub struct InventoryView {
    filters: InventoryFilters,
    records: Vec<DatabaseRecord>,
    options: FilterOptions,
    sequencer: RequestSequencer,
    stale: bool,
}

impl InventoryView {
    pub fn new(filters: InventoryFilters) -> Self {
        Self {
            filters,
            stale: true,
            ..Default::default()
        }
    }

    pub fn filters(&self) -> &InventoryFilters {
        &self.filters
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn records(&self) -> &[DatabaseRecord] {
        &self.records
    }

    pub fn needs_refresh(&self) -> bool {
        self.stale || !self.sequencer.is_settled()
    }

    pub fn begin_refresh(&mut self) -> Ticket {
        self.sequencer.issue()
    }

    /// Applies a fetched record set if `ticket` is still current. Returns
    /// whether it was applied.
    pub fn complete_refresh(&mut self, ticket: Ticket, records: Vec<DatabaseRecord>) -> bool {
        if !self.sequencer.accept(ticket) {
            return false;
        }
        self.options = filter_options(&records, self.filters.provider);
        self.records = records;
        self.stale = false;
        true
    }

    /// Marks the current record set as outdated after a mutation.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Changing provider resets the dependent region selection.
    pub fn set_provider(&mut self, provider: Option<Provider>) {
        if self.filters.provider != provider {
            self.filters.provider = provider;
            self.filters.region = None;
            self.options = filter_options(&self.records, provider);
        }
    }

    /// Selects a region; it must be offered for the current provider.
    pub fn set_region(&mut self, region: Option<String>) -> Result<(), InventoryError> {
        let region = choice(region);
        validate_region(&self.records, self.filters.provider, region.as_deref())?;
        self.filters.region = region;
        Ok(())
    }

    pub fn visible(&self) -> Vec<&DatabaseRecord> {
        apply_filters(&self.records, &self.filters)
    }
}

/// One-shot view for a command. Every filter, the region included, is applied
/// as given; a region with no records for the provider yields an empty set.
pub fn load_view(records: Vec<DatabaseRecord>, filters: InventoryFilters) -> InventoryView {
    let mut view = InventoryView::new(filters);
    let ticket = view.begin_refresh();
    view.complete_refresh(ticket, records);
    view
}

/// Like [`load_view`], but the region is selected through the provider's
/// option list and rejected when that list does not offer it.
pub fn load_checked_view(
    records: Vec<DatabaseRecord>,
    filters: InventoryFilters,
) -> Result<InventoryView, InventoryError> {
    let provider = filters.provider;
    let region = filters.region.clone();
    let mut view = load_view(
        records,
        InventoryFilters {
            provider: None,
            region: None,
            ..filters
        },
    );
    view.set_provider(provider);
    view.set_region(region)?;
    Ok(view)
}
