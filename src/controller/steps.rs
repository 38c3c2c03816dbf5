//! Step operations of stepped buttons

use crate::controls::{Control, HasSteps};
use crate::error::{Capability, ControlError, ControlResult};
use crate::model::ControlId;

fn steps_of<'a>(control: &'a mut Control, control_id: &ControlId) -> ControlResult<&'a mut dyn HasSteps> {
    control
        .as_steps_mut()
        .ok_or_else(|| ControlError::not_supported(control_id, Capability::Steps))
}

impl super::Controller {
    /// Append a step, returning its id
    pub fn step_add(&mut self, control_id: &ControlId) -> ControlResult<Option<u32>> {
        self.modify(control_id, |control, _| Ok(Some(steps_of(control, control_id)?.step_add())))
    }

    /// Remove a step; the last remaining step is kept
    pub fn step_remove(&mut self, control_id: &ControlId, step: u32) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(steps_of(control, control_id)?.step_remove(step, modules))
        })
    }

    pub fn step_duplicate(&mut self, control_id: &ControlId, step: u32) -> ControlResult<Option<u32>> {
        self.modify(control_id, |control, modules| {
            Ok(steps_of(control, control_id)?.step_duplicate(step, modules))
        })
    }

    pub fn step_swap(&mut self, control_id: &ControlId, a: u32, b: u32) -> ControlResult<bool> {
        self.modify(control_id, |control, _| Ok(steps_of(control, control_id)?.step_swap(a, b)))
    }

    /// Make a step current
    pub fn step_select(&mut self, control_id: &ControlId, step: u32) -> ControlResult<bool> {
        self.modify(control_id, |control, _| Ok(steps_of(control, control_id)?.step_select(step)))
    }

    pub fn step_rename(
        &mut self,
        control_id: &ControlId,
        step: u32,
        name: Option<String>,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            Ok(steps_of(control, control_id)?.step_rename(step, name))
        })
    }
}
