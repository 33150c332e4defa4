use std::fmt;

use crate::types::{InterlaceField, Orientation, PixelDensity, ProcessorSettings, SettingsPatch};

/// Destination for settings mirrored onto the GPU.
///
/// [`crate::gpu::UniformWriter`] is the production sink.
pub trait UniformSink {
    /// Whether writes can currently reach the device.
    fn is_ready(&self) -> bool;
    fn write_orientation(&self, orientation: Orientation);
    fn write_pixel_density(&self, density: PixelDensity);
    fn write_interlaced(&self, interlaced: bool);
    fn write_field(&self, field: InterlaceField);
}

/// Runtime settings plus an optional write-through mirror.
///
/// Setters always update local state; the sink only sees the change when
/// one is connected and ready.
#[derive(Default)]
pub struct SettingsManager {
    settings: ProcessorSettings,
    sink: Option<Box<dyn UniformSink>>,
}

impl SettingsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ProcessorSettings) -> Self {
        Self {
            settings,
            sink: None,
        }
    }

    /// Attaches `sink` and pushes every current setting into it.
    pub fn connect(&mut self, sink: Box<dyn UniformSink>) {
        self.sink = Some(sink);
        self.sync();
    }

    pub fn disconnect(&mut self) {
        self.sink = None;
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn settings(&self) -> ProcessorSettings {
        self.settings
    }

    pub fn orientation(&self) -> Orientation {
        self.settings.orientation
    }

    pub fn pixel_density(&self) -> PixelDensity {
        self.settings.pixel_density
    }

    pub fn interlaced(&self) -> bool {
        self.settings.interlaced
    }

    pub fn field(&self) -> InterlaceField {
        self.settings.field
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.settings.orientation = orientation;
        if let Some(sink) = self.ready_sink() {
            sink.write_orientation(orientation);
        }
    }

    pub fn set_pixel_density(&mut self, density: impl Into<PixelDensity>) {
        // PixelDensity construction already clamps to at least 1.
        let density = density.into();
        self.settings.pixel_density = density;
        match self.ready_sink() {
            Some(sink) => sink.write_pixel_density(density),
            None => tracing::debug!(%density, "pixel density stored; no GPU attached"),
        }
    }

    pub fn set_interlaced(&mut self, interlaced: bool) {
        self.settings.interlaced = interlaced;
        if let Some(sink) = self.ready_sink() {
            sink.write_interlaced(interlaced);
        }
    }

    pub fn set_field(&mut self, field: InterlaceField) {
        self.settings.field = field;
        if let Some(sink) = self.ready_sink() {
            sink.write_field(field);
        }
    }

    /// Applies only the fields present in `patch`, each through its setter.
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        if let Some(orientation) = patch.orientation {
            self.set_orientation(orientation);
        }
        if let Some(density) = patch.pixel_density {
            self.set_pixel_density(density);
        }
        if let Some(interlaced) = patch.interlaced {
            self.set_interlaced(interlaced);
        }
        if let Some(field) = patch.field {
            self.set_field(field);
        }
    }

    fn sync(&self) {
        let Some(sink) = self.ready_sink() else {
            tracing::debug!("settings sink connected before the device is ready");
            return;
        };
        sink.write_orientation(self.settings.orientation);
        sink.write_pixel_density(self.settings.pixel_density);
        sink.write_interlaced(self.settings.interlaced);
        sink.write_field(self.settings.field);
    }

    fn ready_sink(&self) -> Option<&dyn UniformSink> {
        self.sink.as_deref().filter(|sink| sink.is_ready())
    }
}

impl fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsManager")
            .field("settings", &self.settings)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        Orientation(Orientation),
        Density(u32),
        Interlaced(bool),
        Field(InterlaceField),
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        writes: Rc<RefCell<Vec<Write>>>,
        lost: Rc<Cell<bool>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<Write> {
            self.writes.borrow_mut().drain(..).collect()
        }
    }

    impl UniformSink for RecordingSink {
        fn is_ready(&self) -> bool {
            !self.lost.get()
        }

        fn write_orientation(&self, orientation: Orientation) {
            self.writes
                .borrow_mut()
                .push(Write::Orientation(orientation));
        }

        fn write_pixel_density(&self, density: PixelDensity) {
            self.writes.borrow_mut().push(Write::Density(density.get()));
        }

        fn write_interlaced(&self, interlaced: bool) {
            self.writes.borrow_mut().push(Write::Interlaced(interlaced));
        }

        fn write_field(&self, field: InterlaceField) {
            self.writes.borrow_mut().push(Write::Field(field));
        }
    }

    #[test]
    fn setters_work_without_a_sink() {
        let mut settings = SettingsManager::new();
        settings.set_orientation(Orientation::Rows);
        settings.set_pixel_density(0u32);
        settings.set_interlaced(true);
        settings.set_field(InterlaceField::Even);

        assert_eq!(settings.orientation(), Orientation::Rows);
        assert_eq!(settings.pixel_density().get(), 1);
        assert!(settings.interlaced());
        assert_eq!(settings.field(), InterlaceField::Even);
    }

    #[test]
    fn connect_pushes_all_four_settings() {
        let sink = RecordingSink::default();
        let mut settings = SettingsManager::with_settings(ProcessorSettings {
            orientation: Orientation::Rows,
            pixel_density: PixelDensity::new(4),
            interlaced: true,
            field: InterlaceField::Even,
        });
        settings.connect(Box::new(sink.clone()));

        assert_eq!(
            sink.take(),
            vec![
                Write::Orientation(Orientation::Rows),
                Write::Density(4),
                Write::Interlaced(true),
                Write::Field(InterlaceField::Even),
            ]
        );
    }

    #[test]
    fn setters_write_through_when_connected() {
        let sink = RecordingSink::default();
        let mut settings = SettingsManager::new();
        settings.connect(Box::new(sink.clone()));
        sink.take();

        settings.set_pixel_density(3u32);
        settings.set_field(InterlaceField::Even);
        assert_eq!(
            sink.take(),
            vec![Write::Density(3), Write::Field(InterlaceField::Even)]
        );
    }

    #[test]
    fn lost_sink_keeps_local_state_only() {
        let sink = RecordingSink::default();
        let mut settings = SettingsManager::new();
        settings.connect(Box::new(sink.clone()));
        sink.take();

        sink.lost.set(true);
        settings.set_interlaced(true);
        assert!(settings.interlaced());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn disconnect_keeps_settings() {
        let sink = RecordingSink::default();
        let mut settings = SettingsManager::new();
        settings.connect(Box::new(sink.clone()));
        settings.set_orientation(Orientation::Rows);
        settings.disconnect();
        sink.take();

        settings.set_orientation(Orientation::Columns);
        assert!(!settings.is_connected());
        assert!(sink.take().is_empty());
        assert_eq!(settings.orientation(), Orientation::Columns);
    }

    #[test]
    fn update_settings_applies_only_present_keys() {
        let sink = RecordingSink::default();
        let mut settings = SettingsManager::new();
        settings.connect(Box::new(sink.clone()));
        sink.take();

        settings.update_settings(SettingsPatch {
            pixel_density: Some(PixelDensity::new(0)),
            interlaced: Some(true),
            ..SettingsPatch::default()
        });

        assert_eq!(
            sink.take(),
            vec![Write::Density(1), Write::Interlaced(true)]
        );
        assert_eq!(settings.orientation(), Orientation::Columns);
        assert_eq!(settings.field(), InterlaceField::Odd);
    }
}
