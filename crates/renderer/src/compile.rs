use crate::backend::UniformKind;
use crate::error::{CompileError, ShaderStage};

/// Uniform a translated program reserves for the drawable size, used to flip
/// `gl_FragCoord` to a bottom-left origin.
pub const VIEWPORT_UNIFORM: &str = "milky_viewport";

/// Member of the std140 uniform block assembled from a fragment source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMember {
    pub name: String,
    pub kind: UniformKind,
    pub offset: u32,
}

/// CPU-side mirror of the uniform block layout; offsets double as locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformBlock {
    members: Vec<BlockMember>,
    size: u32,
}

impl UniformBlock {
    fn push(&mut self, name: &str, kind: UniformKind) {
        let align = kind.alignment();
        let offset = self.size.div_ceil(align) * align;
        self.members.push(BlockMember {
            name: name.to_string(),
            kind,
            offset,
        });
        self.size = offset + kind.size();
    }

    pub fn member(&self, name: &str) -> Option<&BlockMember> {
        self.members.iter().find(|member| member.name == name)
    }

    pub fn members(&self) -> &[BlockMember] {
        &self.members
    }

    /// Buffer size rounded up to a 16-byte multiple, as std140 requires.
    pub fn size(&self) -> u32 {
        self.size.div_ceil(16).max(1) * 16
    }
}

/// Result of turning a WebGL-style fragment program into Vulkan GLSL.
#[derive(Debug, Clone)]
pub struct TranslatedFragment {
    pub glsl: String,
    pub block: UniformBlock,
}

/// Produces a self-contained GLSL 450 fragment shader from catalog source.
///
/// Steps performed:
///
/// 1. Strip `#version` and `precision` directives.
/// 2. Lift every `uniform` declaration into one std140 block bound at
///    `set = 0, binding = 0`; the block has no instance name so the effect
///    keeps addressing its uniforms by their plain names.
/// 3. Map the first `varying vec2` onto the full-screen vertex output.
/// 4. Prepend [`HEADER`], which aliases `gl_FragColor`/`gl_FragCoord` and
///    renames the effect's `main`, then append [`FOOTER`], which flips the
///    fragment coordinate to a bottom-left origin and calls it.
pub fn translate_fragment(source: &str) -> Result<TranslatedFragment, CompileError> {
    let mut block = UniformBlock::default();
    block.push(VIEWPORT_UNIFORM, UniformKind::Vec2);

    let mut body = String::with_capacity(source.len());
    let mut varying_bound = false;
    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
            body.push('\n');
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("uniform ") {
            for (kind, name) in parse_declaration(rest, index + 1)? {
                if block.member(&name).is_some() {
                    let message = format!("uniform '{name}' declared twice");
                    return Err(fragment_error(index + 1, message));
                }
                block.push(&name, kind);
            }
            body.push('\n');
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("varying ") {
            let declared = parse_declaration(rest, index + 1)?;
            match declared.as_slice() {
                [(UniformKind::Vec2, name)] if !varying_bound => {
                    varying_bound = true;
                    body.push_str(&format!("layout(location = 0) in vec2 {name};\n"));
                    continue;
                }
                _ => {
                    let message = "only a single vec2 varying is supported";
                    return Err(fragment_error(index + 1, message));
                }
            }
        }
        body.push_str(line);
        body.push('\n');
    }

    let mut declarations = String::new();
    for member in block.members() {
        declarations.push_str(&format!(
            "    {} {};\n",
            member.kind.glsl_name(),
            member.name
        ));
    }

    let glsl = format!(
        "#version 450\nlayout(std140, set = 0, binding = 0) uniform MilkyUniforms {{\n{declarations}}};\n{HEADER}\n#line 1\n{body}{FOOTER}"
    );
    Ok(TranslatedFragment { glsl, block })
}

/// Parses the remainder of a `uniform`/`varying` line: optional precision
/// qualifier, a type, then one or more comma separated names.
fn parse_declaration(rest: &str, line: usize) -> Result<Vec<(UniformKind, String)>, CompileError> {
    let statement = rest.split(';').next().unwrap_or_default().trim();
    let mut tokens = statement.split_whitespace().peekable();
    if matches!(tokens.peek(), Some(&("lowp" | "mediump" | "highp"))) {
        tokens.next();
    }
    let type_name = tokens
        .next()
        .ok_or_else(|| fragment_error(line, "declaration is missing a type"))?;
    let Some(kind) = UniformKind::from_glsl(type_name) else {
        let message = format!("unsupported uniform type '{type_name}'");
        return Err(fragment_error(line, message));
    };

    let names: String = tokens.collect::<Vec<_>>().join(" ");
    let mut declared = Vec::new();
    for name in names.split(',').map(str::trim) {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            let message = format!("invalid declaration name '{name}'");
            return Err(fragment_error(line, message));
        }
        declared.push((kind, name.to_string()));
    }
    Ok(declared)
}

fn fragment_error(line: usize, message: impl AsRef<str>) -> CompileError {
    CompileError::new(
        ShaderStage::Fragment,
        format!("0:{line}: {}", message.as_ref()),
    )
}

/// Parses and validates a translated fragment with naga, without a GPU.
pub fn validate_fragment(source: &str) -> Result<TranslatedFragment, CompileError> {
    use wgpu::naga;

    let translated = translate_fragment(source)?;
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(naga::ShaderStage::Fragment);
    let module = frontend
        .parse(&options, &translated.glsl)
        .map_err(|err| CompileError::new(ShaderStage::Fragment, err.to_string()))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|err| CompileError::new(ShaderStage::Fragment, err.to_string()))?;
    Ok(translated)
}

/// GLSL prologue injected ahead of every catalog fragment program.
const HEADER: &str = r"layout(location = 0) out vec4 milky_FragColor;
#define gl_FragColor milky_FragColor

vec4 milky_FragCoord;
#define gl_FragCoord milky_FragCoord

#define main milky_effect_main
";

/// GLSL epilogue that restores `main` and delegates to the effect.
const FOOTER: &str = r"#undef main
void main() {
    // Read the hardware builtin, then remap to a bottom-left origin.
    #undef gl_FragCoord
    vec4 builtinFC = gl_FragCoord;
    #define gl_FragCoord milky_FragCoord

    milky_FragCoord = vec4(builtinFC.x, milky_viewport.y - builtinFC.y, builtinFC.z, builtinFC.w);
    milky_FragColor = vec4(0.0, 0.0, 0.0, 1.0);
    milky_effect_main();
}
";

/// Full-screen triangle vertex stage shared by every catalog entry.
pub const FULLSCREEN_VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
