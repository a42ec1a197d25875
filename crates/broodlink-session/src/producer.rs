use broodlink_state::Frame;

/// Seam between the simulation adapter and the session.
///
/// The adapter packs one fully-populated [`Frame`] per simulation tick
/// (units for every player, resources, bullets, creep) plus the ids of units
/// that died since the previous tick. Ticks captured between two protocol
/// exchanges are merged with [`Frame::combine`] before transmission; the
/// adapter itself lives outside this crate.
pub trait FrameProducer {
    /// The next tick's snapshot.
    fn next_frame(&mut self) -> Frame;

    /// Unit ids that died since the last call.
    fn deaths(&mut self) -> Vec<i32>;
}
