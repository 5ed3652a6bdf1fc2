pub trait Traceable {
    /// Short component label (e.g. "CPU", "PPU")
    fn trace_name(&self) -> &'static str;

    /// Whatever details matter for this component, or `None` to skip the line
    fn trace_state(&self) -> Option<String>;

    fn trace(&self) -> Option<String> {
        self.trace_state()
            .map(|state| format!("{} {}", self.trace_name(), state))
    }
}
