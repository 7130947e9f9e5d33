pub mod grid;
pub mod zoom;

pub use grid::{
    cell_side, request_side, CellSlot, CellState, GridController, GridSurface, SnapshotSink,
    SnapshotUpdate,
};
pub use zoom::{
    parameters_for_velocity, step_multiplier, ColumnDensityController, GesturePhase, PinchEvent,
    PinchPhase, ZoomOutcome, ZoomParameters,
};
