/// Channel handling when a whole file is decoded into a [`Wave`](super::Wave).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConvertToMono {
    /// Keep the file's channel layout.
    #[default]
    Original,
    /// Average every channel into a single `Mono` channel. Positional voices
    /// collapse to mono anyway, so this halves memory for spatial assets.
    ForceMono,
}

/// Options for [`Wave::from_path_with_options`](super::Wave::from_path_with_options).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub convert_to_mono: ConvertToMono,
    /// Resample after decoding; `None` keeps the file's rate.
    pub target_sample_rate: Option<u32>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }

    /// Pre-converts to the device rate so the mixer reads at unit step.
    pub fn target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = LoadOptions::new()
            .convert_to_mono(ConvertToMono::ForceMono)
            .target_sample_rate(48000);
        assert_eq!(options.convert_to_mono, ConvertToMono::ForceMono);
        assert_eq!(options.target_sample_rate, Some(48000));
        assert_eq!(LoadOptions::default().target_sample_rate, None);
    }
}
