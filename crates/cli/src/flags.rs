use clap::ValueEnum;

/// `--embed-mode` / `--judge-mode`: real ONNX sessions or deterministic stubs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ModeFlag {
    Fast,
    Stub,
}

impl ModeFlag {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            ModeFlag::Fast => "fast",
            ModeFlag::Stub => "stub",
        }
    }
}
