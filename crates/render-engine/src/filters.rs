//! Translation of plan treatment into ffmpeg filter expressions.
//!
//! Everything here is string building over validated plan data; nothing
//! touches the filesystem or spawns processes.

use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_plan_model::{FilterSpec, PanZoom, RenderConfig, Transform2D};

/// Every filter name a plan may use.
pub const SUPPORTED_FILTERS: &[&str] = &[
    "brightness",
    "contrast",
    "saturation",
    "grayscale",
    "sepia",
    "vignette",
    "blur",
    "sharpen",
    "hue",
    "warm",
    "tint",
];

/// Peak extra zoom applied on each beat.
const BEAT_PULSE_ZOOM: f64 = 0.015;

/// Translate one filter into an ffmpeg filter.
///
/// Unknown names, unknown parameter keys and out-of-range values are plan
/// errors.
pub fn compile_filter(spec: &FilterSpec) -> ReelResult<String> {
    let name = spec.name.trim().to_ascii_lowercase();
    let params = Params { spec };

    let compiled = match name.as_str() {
        "brightness" => {
            params.only(&["amount"])?;
            format!("eq=brightness={:.4}", params.number("amount", 0.1, -1.0, 1.0)?)
        }
        "contrast" => {
            params.only(&["amount"])?;
            format!("eq=contrast={:.4}", params.number("amount", 1.2, 0.0, 3.0)?)
        }
        "saturation" => {
            params.only(&["amount"])?;
            format!("eq=saturation={:.4}", params.number("amount", 1.3, 0.0, 3.0)?)
        }
        "grayscale" => {
            params.only(&[])?;
            "hue=s=0".to_string()
        }
        "sepia" => {
            params.only(&[])?;
            "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131".to_string()
        }
        "vignette" => {
            params.only(&["strength"])?;
            let strength = params.number("strength", 0.5, 0.0, 1.0)?;
            format!(
                "vignette=angle={:.4}",
                (strength * std::f64::consts::FRAC_PI_2).max(0.01)
            )
        }
        "blur" => {
            params.only(&["radius"])?;
            format!("gblur=sigma={:.3}", params.number("radius", 4.0, 0.0, 50.0)?)
        }
        "sharpen" => {
            params.only(&["amount"])?;
            format!(
                "unsharp=5:5:{:.3}:5:5:0",
                params.number("amount", 1.0, 0.0, 5.0)?
            )
        }
        "hue" => {
            params.only(&["degrees"])?;
            let degrees = params.required_number("degrees", -180.0, 180.0)?;
            format!("hue=h={degrees:.3}")
        }
        "warm" => {
            params.only(&["amount"])?;
            let amount = params.number("amount", 0.3, 0.0, 1.0)?;
            format!(
                "colorbalance=rm={:.4}:bm={:.4}",
                amount * 0.3,
                -amount * 0.3
            )
        }
        "tint" => {
            params.only(&["color", "opacity"])?;
            let color = spec.color("color").ok_or_else(|| {
                ReelError::invalid_plan("filter 'tint' requires a 'color' parameter")
            })?;
            let opacity = params.number("opacity", 0.2, 0.0, 1.0)?;
            format!(
                "drawbox=x=0:y=0:w=iw:h=ih:color={}@{opacity:.3}:t=fill",
                color.hex_rgb()
            )
        }
        other => {
            return Err(ReelError::invalid_plan(format!(
                "unknown filter '{other}' (supported: {})",
                SUPPORTED_FILTERS.join(", ")
            )))
        }
    };
    Ok(compiled)
}

/// Translate a filter chain in order.
pub fn compile_chain(filters: &[FilterSpec]) -> ReelResult<Vec<String>> {
    filters.iter().map(compile_filter).collect()
}

struct Params<'a> {
    spec: &'a FilterSpec,
}

impl Params<'_> {
    fn only(&self, allowed: &[&str]) -> ReelResult<()> {
        match self.spec.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(ReelError::invalid_plan(format!(
                "filter '{}' has unknown parameter '{key}'",
                self.spec.name
            ))),
            None => Ok(()),
        }
    }

    fn number(&self, key: &str, default: f64, min: f64, max: f64) -> ReelResult<f64> {
        if !self.spec.params.contains_key(key) {
            return Ok(default);
        }
        self.required_number(key, min, max)
    }

    fn required_number(&self, key: &str, min: f64, max: f64) -> ReelResult<f64> {
        let value = self.spec.number(key).ok_or_else(|| {
            ReelError::invalid_plan(format!(
                "filter '{}' requires numeric parameter '{key}'",
                self.spec.name
            ))
        })?;
        if !value.is_finite() || value < min || value > max {
            return Err(ReelError::invalid_plan(format!(
                "filter '{}' parameter '{key}' = {value} outside [{min}, {max}]",
                self.spec.name
            )));
        }
        Ok(value)
    }
}

/// Filters for a 2D transform applied to a canvas-sized frame.
///
/// Scale and rotation pivot on the frame center; translation is a fraction of
/// the canvas. Returns an empty list for the identity. The caller keeps the
/// frame on a canvas-sized background; the translation is returned separately
/// as pixel offsets for that overlay.
pub fn transform_filters(transform: &Transform2D, config: &RenderConfig) -> (Vec<String>, (i64, i64)) {
    if transform.is_identity() {
        return (Vec::new(), (0, 0));
    }
    let parts = transform.decompose();
    let mut chain = Vec::new();

    let (sx, sy) = (parts.scale_x.abs(), parts.scale_y.abs());
    if (sx - 1.0).abs() > 1e-6 || (sy - 1.0).abs() > 1e-6 {
        chain.push(format!(
            "scale=w='max(2,trunc(iw*{sx:.6}/2)*2)':h='max(2,trunc(ih*{sy:.6}/2)*2)'"
        ));
    }
    if parts.scale_y < 0.0 {
        chain.push("vflip".to_string());
    }
    if parts.shear.abs() > 1e-6 {
        chain.push(format!(
            "shear=shx={:.6}:fillcolor=none",
            parts.shear / parts.scale_x.max(1e-6)
        ));
    }
    if parts.rotation.abs() > 1e-6 {
        // ffmpeg rotates clockwise for positive angles in screen space.
        chain.push(format!(
            "rotate=a={:.6}:ow='rotw({:.6})':oh='roth({:.6})':c=none",
            parts.rotation, parts.rotation, parts.rotation
        ));
    }

    let dx = (parts.translate_x * config.width() as f64).round() as i64;
    let dy = (parts.translate_y * config.height() as f64).round() as i64;
    (chain, (dx, dy))
}

/// Easing curve in ffmpeg expression syntax over a progress expression `p`.
pub fn ease_expr(p: &str, premium: bool) -> String {
    if premium {
        format!("(({p})*({p})*(3-2*({p})))")
    } else {
        format!("({p})")
    }
}

/// `zoompan` filter for pan/zoom motion over `frames` frames.
///
/// The output is `width x height` (the fitted size). With `premium` the
/// motion uses smoothstep easing, and with a beat tempo as well a short zoom
/// pulse lands on every beat.
pub fn pan_zoom_filter(
    motion: &PanZoom,
    config: &RenderConfig,
    frames: u64,
    width: u32,
    height: u32,
) -> String {
    let span = frames.saturating_sub(1).max(1);
    let progress = format!("min(1,on/{span})");
    let eased = ease_expr(&progress, config.premium());

    let lerp = |from: f64, to: f64| -> String {
        if (to - from).abs() < 1e-9 {
            format!("{from:.6}")
        } else {
            format!("({from:.6}+({:.6})*{eased})", to - from)
        }
    };

    let mut zoom = lerp(motion.from_zoom, motion.to_zoom);
    if config.premium() {
        if let Some(beat) = config.beat_interval_secs() {
            zoom = format!(
                "{zoom}*(1+{BEAT_PULSE_ZOOM}*exp(-8*mod(on/{fps},{beat:.6})/{beat:.6}))",
                fps = config.fps()
            );
        }
    }
    let cx = lerp(motion.from_center.x, motion.to_center.x);
    let cy = lerp(motion.from_center.y, motion.to_center.y);

    format!(
        "zoompan=z='{zoom}':x='max(0,min(iw-iw/zoom,{cx}*iw-iw/zoom/2))':y='max(0,min(ih-ih/zoom,{cy}*ih-ih/zoom/2))':d=1:s={width}x{height}:fps={fps}",
        fps = config.fps()
    )
}

/// Piecewise-linear expression in `t` through `(time, value)` points.
///
/// Holds the first value before the first point and the last value after the
/// last point.
pub fn build_piecewise_expr(mut points: Vec<(f64, f64)>) -> String {
    if points.is_empty() {
        return "0".to_string();
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut sanitized: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for (t, v) in points {
        if let Some((last_t, last_v)) = sanitized.last_mut() {
            if (t - *last_t).abs() < 1e-4 {
                *last_t = t;
                *last_v = v;
                continue;
            }
        }
        sanitized.push((t, v));
    }

    let (first_t, first_v) = sanitized[0];
    let (_, last_v) = sanitized[sanitized.len() - 1];
    if sanitized.len() == 1 {
        return format!("{first_v:.6}");
    }

    let mut expr = format!("{last_v:.6}");
    for idx in (0..sanitized.len() - 1).rev() {
        let (t0, v0) = sanitized[idx];
        let (t1, v1) = sanitized[idx + 1];
        let interp = format!(
            "{v0:.6}+({delta:.6})*(t-{t0:.6})/{dur:.6}",
            delta = v1 - v0,
            dur = (t1 - t0).max(1e-4)
        );
        expr = format!("if(lt(t,{t1:.6}),{interp},{expr})");
    }
    format!("if(lt(t,{first_t:.6}),{first_v:.6},{expr})")
}

/// Escape a string for a single-quoted drawtext `text=` value.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("'\\''"),
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}
