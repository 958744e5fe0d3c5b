//! Ticket processing pipeline.
//!
//! Webhooks carry little more than a ticket id; everything else flows
//! through here:
//! 1. `DeskClient::get_ticket()`: fetch the full ticket
//! 2. `strip_html()` + `Classifier::classify()`: LLM classification
//! 3. `route()`: pure routing rules
//! 4. `TicketTagger::apply()`: write results back to the ticket
//! 5. `AnalyticsLogger`: one classification event per ticket, success or not
//!
//! Ticket-updated events take a separate, much shorter path: extract the
//! CSR's corrected intent and record it for accuracy tracking.

pub mod processor;

pub use processor::{ProcessedTicket, TicketProcessor};
