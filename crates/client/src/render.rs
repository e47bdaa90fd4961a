use mlsp::grid::CellCoord;

/// A local user-input signal: "the player wants to claim this cell now."
/// The UI layer raises these; [`crate::net::NetworkClient`] turns them
/// into timestamped ACQUIRE_REQ packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub coord: CellCoord,
}

/// Decouples the network/game-state layer from whatever draws the grid.
/// Implementations must treat `on_grid_applied` as "redraw now, in
/// place" — the grid the client holds is never replaced, only mutated,
/// so a sink that caches a reference to it stays valid across updates.
pub trait RenderSink: Send {
    fn on_grid_applied(&mut self, grid: &mlsp::Grid);
    fn on_game_over(&mut self, winner: &str, scores: &std::collections::HashMap<String, u32>);
}

/// A sink that does nothing, for headless runs and tests.
#[derive(Debug, Default)]
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn on_grid_applied(&mut self, _grid: &mlsp::Grid) {}
    fn on_game_over(&mut self, _winner: &str, _scores: &std::collections::HashMap<String, u32>) {}
}
