mod ticket;
mod transition;

pub use ticket::{Actor, NewTicket, Role, Status, Ticket, TicketId, Worker, WorkerId};
pub use transition::{Action, ActionKind, Rejection, Rule, StateMachine};
