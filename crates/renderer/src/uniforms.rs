use chrono::{DateTime, Datelike, Local, Timelike};

use crate::backend::{GraphicsContext, UniformKind, UniformValue};
use crate::clock::TimeSample;
use crate::program::{CompiledProgram, ProgramSource, UniformBindings};
use crate::types::PixelSize;

/// Per-frame inputs gathered by the owning surface.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs {
    pub time: TimeSample,
    pub resolution: PixelSize,
    /// `iMouse` convention: current xy, click xy.
    pub pointer: [f32; 4],
    pub date: [f32; 4],
}

impl FrameInputs {
    pub fn new(time: TimeSample, resolution: PixelSize) -> Self {
        Self {
            time,
            resolution,
            pointer: [0.0; 4],
            date: date_vector(Local::now()),
        }
    }
}

/// `iDate` layout: year, month, day, seconds since midnight.
pub fn date_vector(now: DateTime<Local>) -> [f32; 4] {
    let seconds_since_midnight =
        now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 / 1_000_000_000.0;
    [
        now.year() as f32,
        now.month() as f32,
        now.day() as f32,
        seconds_since_midnight,
    ]
}

/// Uniform values a surface pushes before every draw.
///
/// Holds the binding names captured at build time plus entry-specific
/// values (defaults overlaid with caller edits). Applying the feed only
/// writes through existing locations; it never allocates.
#[derive(Debug, Clone)]
pub struct UniformFeed {
    bindings: UniformBindings,
    values: Vec<(String, UniformValue)>,
}

impl UniformFeed {
    pub fn new(source: &ProgramSource) -> Self {
        Self {
            bindings: source.bindings.clone(),
            values: source.defaults.clone(),
        }
    }

    pub fn bindings(&self) -> &UniformBindings {
        &self.bindings
    }

    pub fn value(&self, name: &str) -> Option<UniformValue> {
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    /// Replaces or adds an entry-specific value.
    pub fn set(&mut self, name: &str, value: UniformValue) {
        let existing = self.values.iter_mut().find(|(key, _)| key == name);
        match existing {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    /// Writes the frame's time, resolution and optional builtins, then every
    /// entry-specific value the program declares. Names the program does not
    /// declare are skipped silently.
    pub fn apply<C: GraphicsContext>(
        &self,
        context: &mut C,
        program: &CompiledProgram<C>,
        inputs: &FrameInputs,
    ) {
        let handle = program.handle();
        let [width, height] = inputs.resolution.as_vec2();

        if let Some(slot) = program.uniform(&self.bindings.time) {
            if let Some(value) = scalar(slot.kind, inputs.time.seconds) {
                context.set_uniform(handle, slot.location, value);
            }
        }
        if let Some(slot) = program.uniform(&self.bindings.resolution) {
            let value = match slot.kind {
                UniformKind::Vec2 => Some(UniformValue::Vec2([width, height])),
                UniformKind::Vec3 => Some(UniformValue::Vec3([width, height, 1.0])),
                UniformKind::Vec4 => Some(UniformValue::Vec4([width, height, 1.0, 0.0])),
                UniformKind::Float | UniformKind::Int => None,
            };
            if let Some(value) = value {
                context.set_uniform(handle, slot.location, value);
            }
        }
        if let Some(slot) = program.uniform("iTimeDelta") {
            if let Some(value) = scalar(slot.kind, inputs.time.delta) {
                context.set_uniform(handle, slot.location, value);
            }
        }
        if let Some(slot) = program.uniform("iFrame") {
            let frame = inputs.time.frame_index.min(i32::MAX as u64) as i32;
            let value = match slot.kind {
                UniformKind::Int => Some(UniformValue::Int(frame)),
                UniformKind::Float => Some(UniformValue::Float(frame as f32)),
                _ => None,
            };
            if let Some(value) = value {
                context.set_uniform(handle, slot.location, value);
            }
        }
        if let Some(slot) = program.uniform("iMouse") {
            if slot.kind == UniformKind::Vec4 {
                context.set_uniform(handle, slot.location, UniformValue::Vec4(inputs.pointer));
            }
        }
        if let Some(slot) = program.uniform("iDate") {
            if slot.kind == UniformKind::Vec4 {
                context.set_uniform(handle, slot.location, UniformValue::Vec4(inputs.date));
            }
        }

        for (name, value) in &self.values {
            if let Some(slot) = program.uniform(name) {
                if slot.kind == value.kind() {
                    context.set_uniform(handle, slot.location, *value);
                }
            }
        }
    }
}

fn scalar(kind: UniformKind, value: f32) -> Option<UniformValue> {
    match kind {
        UniformKind::Float => Some(UniformValue::Float(value)),
        UniformKind::Int => Some(UniformValue::Int(value as i32)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::backend::ContextHost;
    use crate::program::{ProgramCache, ProgramFactory};
    use crate::testing::{RecordingContainer, RecordingHost};
    use crate::types::ContextProfile;

    struct Effect(ProgramSource);

    impl ProgramFactory for Effect {
        fn program_id(&self) -> &str {
            "effect"
        }

        fn program_source(&self) -> &ProgramSource {
            &self.0
        }
    }

    fn inputs(seconds: f32) -> FrameInputs {
        FrameInputs {
            time: TimeSample {
                seconds,
                delta: 0.016,
                frame_index: 3,
            },
            resolution: PixelSize::new(640, 360),
            pointer: [0.0; 4],
            date: [2026.0, 10.0, 19.0, 3600.0],
        }
    }

    #[test]
    fn writes_short_names_with_vec2_resolution() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(640, 360));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let text = concat!(
            "uniform float t;\nuniform vec2 r;\n",
            "uniform float colorIntensity;\nvoid main() {}\n",
        );
        let bindings = UniformBindings {
            time: "t".into(),
            resolution: "r".into(),
        };
        let source = ProgramSource::fullscreen(text)
            .with_bindings(bindings)
            .with_default("colorIntensity", UniformValue::Float(1.0));
        let effect = Effect(source);
        let program = ProgramCache::new().build(&effect, &mut context).unwrap();

        let feed = UniformFeed::new(effect.program_source());
        feed.apply(&mut context, &program, &inputs(2.5));

        assert_eq!(context.uniform_value("t"), Some(UniformValue::Float(2.5)));
        assert_eq!(
            context.uniform_value("r"),
            Some(UniformValue::Vec2([640.0, 360.0]))
        );
        assert_eq!(
            context.uniform_value("colorIntensity"),
            Some(UniformValue::Float(1.0))
        );
    }

    #[test]
    fn vec3_resolution_gets_unit_z_and_builtins_are_fed() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(640, 360));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let effect = Effect(ProgramSource::fullscreen(
            "uniform float iTime;\nuniform vec3 iResolution;\nuniform int iFrame;\nuniform vec4 iDate;\nvoid main() {}\n",
        ));
        let program = ProgramCache::new().build(&effect, &mut context).unwrap();

        UniformFeed::new(effect.program_source()).apply(&mut context, &program, &inputs(1.0));

        assert_eq!(
            context.uniform_value("iResolution"),
            Some(UniformValue::Vec3([640.0, 360.0, 1.0]))
        );
        assert_eq!(context.uniform_value("iFrame"), Some(UniformValue::Int(3)));
        assert_eq!(
            context.uniform_value("iDate"),
            Some(UniformValue::Vec4([2026.0, 10.0, 19.0, 3600.0]))
        );
    }

    #[test]
    fn overrides_replace_defaults_and_mismatched_kinds_are_skipped() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let effect = Effect(
            ProgramSource::fullscreen("uniform float speed;\nvoid main() {}\n")
                .with_default("speed", UniformValue::Float(1.0)),
        );
        let program = ProgramCache::new().build(&effect, &mut context).unwrap();
        let mut feed = UniformFeed::new(effect.program_source());

        feed.set("speed", UniformValue::Vec2([1.0, 2.0]));
        feed.apply(&mut context, &program, &inputs(0.0));
        assert_eq!(context.uniform_value("speed"), None);

        feed.set("speed", UniformValue::Float(0.25));
        feed.apply(&mut context, &program, &inputs(0.0));
        assert_eq!(
            context.uniform_value("speed"),
            Some(UniformValue::Float(0.25))
        );
    }

    #[test]
    fn date_vector_counts_seconds_from_midnight() {
        let date = Local.with_ymd_and_hms(2026, 10, 19, 1, 2, 3).unwrap();
        assert_eq!(date_vector(date), [2026.0, 10.0, 19.0, 3723.0]);
    }
}
