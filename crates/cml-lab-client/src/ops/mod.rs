//! Mutators and directory reads, grouped per entity.
//!
//! Node state changes are checked against [`State::can_transition_to`]
//! before any request is issued.

mod directory;
mod group;
mod interface;
mod lab;
mod link;
mod node;
mod user;

pub use link::{select_interface, SlotChoice};

use cml_lab_core::State;

use crate::error::{ClientError, Result};

fn ensure_transition(entity: String, from: State, to: State) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ClientError::IllegalStateTransition { entity, from, to })
    }
}

fn ensure_state(entity: String, state: State, required: State) -> Result<()> {
    if state.normalized() == required.normalized() {
        Ok(())
    } else {
        Err(ClientError::NotInState {
            entity,
            state,
            required,
        })
    }
}
