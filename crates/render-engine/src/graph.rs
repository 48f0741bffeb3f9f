//! ffmpeg filter graphs for still segments and the final export.
//!
//! # Export graph layout
//!
//! ```text
//! [0:v] trim,setpts,scale,pad,fps(,tpad) ─┐
//! [1:v] trim,setpts,scale,pad,fps(,tpad) ─┼── concat ── [base]
//! [n:v] ...                               ─┘               │
//!                                                          ├── drawtext / overlay (layer 0, enable window)
//!                                                          ├── ...
//!                                                          ▼
//!                                                       [vout]
//! [a:a] (-stream_loop -1) atrim ── volume ── [aout]
//! ```

use std::fmt::Write as _;
use std::path::PathBuf;

use reelsmith_common::clock::frames_for;
use reelsmith_common::error::ReelResult;
use reelsmith_plan_model::{Corner, MediaTime};

use crate::assembler::{AudioTrack, Composition, CompositionSegment};
use crate::encoder::{ExportJob, StillSegmentJob};
use crate::filters::{
    build_piecewise_expr, compile_chain, escape_drawtext, pan_zoom_filter, transform_filters,
};
use crate::overlay::{Anchor, LayerContent, LayerEffect, OverlayLayer};

/// How an input file is opened.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    /// Regular media file.
    File(PathBuf),
    /// Single image repeated as a video stream.
    LoopedImage(PathBuf),
    /// Audio file read back to back without end.
    LoopedAudio(PathBuf),
}

/// A complete `-filter_complex` graph with its inputs.
#[derive(Debug, Clone)]
pub struct FilterGraph {
    pub inputs: Vec<InputSpec>,
    pub filter_complex: String,
    pub video_label: String,
    pub audio_label: Option<String>,
    pub total_frames: u64,
    pub duration: MediaTime,
}

/// Graph rendering one still into a canvas-sized segment.
pub fn still_segment_graph(job: &StillSegmentJob) -> ReelResult<FilterGraph> {
    let config = &job.config;
    let frames = frames_for(job.duration.as_micros(), config.fps());
    let fit = job.fit;

    let mut chain = vec![format!(
        "scale={}:{}:flags=lanczos",
        fit.scaled_width, fit.scaled_height
    )];
    chain.push("setsar=1".to_string());
    if let Some(motion) = &job.motion {
        chain.push(pan_zoom_filter(
            motion,
            config,
            frames,
            fit.scaled_width,
            fit.scaled_height,
        ));
    }
    chain.extend(compile_chain(&job.filters)?);
    chain.push("format=rgba".to_string());
    let (transform, (dx, dy)) = transform_filters(&job.transform, config);
    chain.extend(transform);

    let filter_complex = format!(
        "[0:v]{chain}[fg];color=c=black:s={w}x{h}:r={fps}[bg];[bg][fg]overlay=x='(W-w)/2{dx:+}':y='(H-h)/2{dy:+}':shortest=1,format=yuv420p[v]",
        chain = chain.join(","),
        w = config.width(),
        h = config.height(),
        fps = config.fps(),
    );

    Ok(FilterGraph {
        inputs: vec![InputSpec::LoopedImage(job.image.clone())],
        filter_complex,
        video_label: "[v]".to_string(),
        audio_label: None,
        total_frames: frames,
        duration: job.duration,
    })
}

/// Graph concatenating the composition and compositing overlay layers.
pub fn export_graph(job: &ExportJob) -> FilterGraph {
    let composition = &job.composition;
    let mut inputs = Vec::new();
    let mut graph = String::new();

    for (i, segment) in composition.segments.iter().enumerate() {
        inputs.push(InputSpec::File(segment.path.clone()));
        let _ = write!(
            graph,
            "[{i}:v]{}[s{i}];",
            segment_chain(segment, composition)
        );
    }
    for i in 0..composition.segments.len() {
        let _ = write!(graph, "[s{i}]");
    }
    let _ = write!(
        graph,
        "concat=n={}:v=1:a=0[base]",
        composition.segments.len()
    );

    let mut current = "base".to_string();
    for layer in &job.layers {
        let next = format!("o{}", layer.index);
        let stage = match &layer.content {
            LayerContent::Text { .. } => text_layer(layer, composition, &current, &next),
            LayerContent::Image { path, .. } => {
                let input = inputs.len();
                inputs.push(InputSpec::LoopedImage(path.clone()));
                image_layer(layer, input, &current, &next)
            }
        };
        graph.push(';');
        graph.push_str(&stage);
        current = next;
    }
    let _ = write!(graph, ";[{current}]format=yuv420p[vout]");

    let audio_label = composition.audio.as_ref().map(|audio| {
        let input = inputs.len();
        inputs.push(if audio.loops.repeats() {
            InputSpec::LoopedAudio(audio.path.clone())
        } else {
            InputSpec::File(audio.path.clone())
        });
        graph.push(';');
        graph.push_str(&audio_chain(audio, input));
        "[aout]".to_string()
    });

    FilterGraph {
        inputs,
        filter_complex: graph,
        video_label: "[vout]".to_string(),
        audio_label,
        total_frames: frames_for(composition.duration.as_micros(), composition.fps),
        duration: composition.duration,
    }
}

fn segment_chain(segment: &CompositionSegment, composition: &Composition) -> String {
    let fit = segment.fit;
    let playable = segment.range.duration.min(segment.source_duration);
    let mut chain = format!(
        "trim=duration={:.6},setpts=PTS-STARTPTS,scale={}:{}:flags=lanczos,setsar=1,pad={}:{}:{}:{}:color=black,fps={}",
        playable.as_secs_f64(),
        fit.scaled_width,
        fit.scaled_height,
        composition.width,
        composition.height,
        fit.offset_x,
        fit.offset_y,
        composition.fps,
    );
    if !segment.hold.is_zero() {
        let _ = write!(
            chain,
            ",tpad=stop_mode=clone:stop_duration={:.6}",
            segment.hold.as_secs_f64()
        );
    }
    chain.push_str(",format=yuv420p");
    chain
}

fn audio_chain(audio: &AudioTrack, input: usize) -> String {
    format!(
        "[{input}:a]atrim=duration={:.6},asetpts=PTS-STARTPTS,volume={:.3}[aout]",
        audio.covered().as_secs_f64(),
        audio.volume
    )
}

fn enable_expr(layer: &OverlayLayer) -> String {
    format!(
        "gte(t,{:.6})*lt(t,{:.6})",
        layer.window.start.as_secs_f64(),
        layer.window.end().as_secs_f64()
    )
}

fn alpha_expr(layer: &OverlayLayer) -> Option<String> {
    let start = layer.window.start.as_secs_f64();
    let end = layer.window.end().as_secs_f64();
    let mut points = Vec::new();
    for effect in &layer.effects {
        match *effect {
            LayerEffect::FadeIn { secs } | LayerEffect::SlideUp { secs, .. } if secs > 0.0 => {
                points.push((start, 0.0));
                points.push((start + secs, 1.0));
            }
            LayerEffect::FadeOut { secs } if secs > 0.0 => {
                points.push((end - secs, 1.0));
                points.push((end, 0.0));
            }
            _ => {}
        }
    }
    (!points.is_empty()).then(|| build_piecewise_expr(points))
}

/// Vertical offset expression for a slide-up entrance, in pixels.
fn slide_expr(layer: &OverlayLayer) -> Option<String> {
    layer.effects.iter().find_map(|effect| match *effect {
        LayerEffect::SlideUp { secs, distance_px } => {
            let start = layer.window.start.as_secs_f64();
            Some(build_piecewise_expr(vec![
                (start, distance_px),
                (start + secs.max(1e-3), 0.0),
            ]))
        }
        _ => None,
    })
}

/// `(x, y)` expressions for a layer of size `(w, h)` on a `(cw, ch)` canvas.
fn position_exprs(anchor: &Anchor, w: &str, h: &str, cw: &str, ch: &str) -> (String, String) {
    match *anchor {
        Anchor::Center { x, y } => (format!("{x:.2}-{w}/2"), format!("{y:.2}-{h}/2")),
        Anchor::Corner { corner, margin_px } => {
            let left = format!("{margin_px}");
            let right = format!("{cw}-{w}-{margin_px}");
            let top = format!("{margin_px}");
            let bottom = format!("{ch}-{h}-{margin_px}");
            match corner {
                Corner::TopLeft => (left, top),
                Corner::TopRight => (right, top),
                Corner::BottomLeft => (left, bottom),
                Corner::BottomRight => (right, bottom),
            }
        }
    }
}

fn text_layer(layer: &OverlayLayer, composition: &Composition, input: &str, output: &str) -> String {
    let LayerContent::Text {
        text,
        font_px,
        color,
        background,
        shadow_offset_px,
    } = &layer.content
    else {
        return format!("[{input}]null[{output}]");
    };

    let (x, mut y) = position_exprs(&layer.anchor, "text_w", "text_h", "w", "h");
    if let Some(slide) = slide_expr(layer) {
        y = format!("{y}+({slide})");
    }

    let font_size = match layer.effects.iter().find_map(|e| match *e {
        LayerEffect::PopIn { secs } => Some(secs),
        _ => None,
    }) {
        Some(secs) => format!(
            "'{font_px}*min(1,0.6+0.4*max(0,t-{:.6})/{:.6})'",
            layer.window.start.as_secs_f64(),
            secs.max(1e-3)
        ),
        None => font_px.to_string(),
    };

    let mut draw = format!(
        "drawtext=text='{}':expansion=none:fontsize={font_size}:fontcolor={}@{:.3}:x='{x}':y='{y}'",
        escape_drawtext(text),
        color.hex_rgb(),
        color.alpha_f64(),
    );
    if let Some(bg) = background {
        let _ = write!(
            draw,
            ":box=1:boxcolor={}@{:.3}:boxborderw={}",
            bg.hex_rgb(),
            bg.alpha_f64(),
            (font_px / 3).max(4)
        );
    }
    if let Some(offset) = shadow_offset_px {
        let _ = write!(
            draw,
            ":shadowx={offset}:shadowy={offset}:shadowcolor=black@0.6"
        );
    }
    if let Some(alpha) = alpha_expr(layer) {
        let _ = write!(draw, ":alpha='{alpha}'");
    }
    let _ = write!(draw, ":enable='{}'", enable_expr(layer));

    let blur = layer.effects.iter().find_map(|e| match *e {
        LayerEffect::ShadowBlur { radius_px } => Some(radius_px),
        _ => None,
    });
    match blur {
        Some(radius) => {
            let offset = shadow_offset_px.unwrap_or(2);
            let shadow = format!(
                "drawtext=text='{}':expansion=none:fontsize={font_size}:fontcolor=black@0.55:x='{x}+{offset}':y='{y}+{offset}':enable='{}'",
                escape_drawtext(text),
                enable_expr(layer)
            );
            format!(
                "color=c=black@0.0:s={w}x{h}:r={fps},format=rgba,{shadow},gblur=sigma={radius}[{output}sh];[{input}][{output}sh]overlay=shortest=1:enable='{enable}'[{output}b];[{output}b]{draw}[{output}]",
                w = composition.width,
                h = composition.height,
                fps = composition.fps,
                enable = enable_expr(layer),
            )
        }
        None => format!("[{input}]{draw}[{output}]"),
    }
}

fn image_layer(layer: &OverlayLayer, input_index: usize, input: &str, output: &str) -> String {
    let LayerContent::Image {
        width_px, opacity, ..
    } = &layer.content
    else {
        return format!("[{input}]null[{output}]");
    };
    let start = layer.window.start.as_secs_f64();
    let end = layer.window.end().as_secs_f64();

    let mut chain = vec![
        "format=rgba".to_string(),
        format!("scale={width_px}:-2:flags=lanczos"),
    ];
    for effect in &layer.effects {
        match *effect {
            LayerEffect::PopIn { secs } => chain.push(format!(
                "scale=w='trunc(iw*min(1,0.6+0.4*max(0,t-{start:.6})/{:.6})/2)*2':h=-2:eval=frame",
                secs.max(1e-3)
            )),
            LayerEffect::Pulse {
                period_secs,
                amplitude,
            } => chain.push(format!(
                "scale=w='trunc(iw*(1+{amplitude:.4}*sin(2*PI*t/{period_secs:.6}))/2)*2':h=-2:eval=frame"
            )),
            LayerEffect::Spin { period_secs } => chain.push(format!(
                "rotate=a='2*PI*t/{period_secs:.6}':ow='hypot(iw,ih)':oh=ow:c=none"
            )),
            LayerEffect::FadeIn { secs } | LayerEffect::SlideUp { secs, .. } if secs > 0.0 => {
                chain.push(format!("fade=t=in:st={start:.6}:d={secs:.6}:alpha=1"))
            }
            LayerEffect::FadeOut { secs } if secs > 0.0 => chain.push(format!(
                "fade=t=out:st={:.6}:d={secs:.6}:alpha=1",
                end - secs
            )),
            _ => {}
        }
    }
    if *opacity < 1.0 {
        chain.push(format!("colorchannelmixer=aa={opacity:.3}"));
    }

    let (x, mut y) = position_exprs(&layer.anchor, "w", "h", "W", "H");
    if let Some(slide) = slide_expr(layer) {
        y = format!("{y}+({slide})");
    }

    format!(
        "[{input_index}:v]{chain}[{output}i];[{input}][{output}i]overlay=x='{x}':y='{y}':eval=frame:shortest=1:enable='{enable}'[{output}]",
        chain = chain.join(","),
        enable = enable_expr(layer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{aspect_fit, plan_audio_loops};
    use crate::overlay::OverlayLayerFactory;
    use reelsmith_plan_model::{
        FilterSpec, Overlay, RenderConfig, TimeRange, Transform2D,
    };

    fn secs(s: f64) -> MediaTime {
        MediaTime::from_secs_f64(s)
    }

    fn config() -> RenderConfig {
        RenderConfig::builder().size(1080, 1920).fps(30).build().unwrap()
    }

    fn composition(audio: Option<AudioTrack>) -> Composition {
        let seg = |index: usize, start: f64, dur: f64, source: f64| CompositionSegment {
            index,
            path: PathBuf::from(format!("seg{index}.mp4")),
            range: TimeRange::from_secs(start, dur),
            source_duration: secs(source),
            fit: aspect_fit(1920, 1080, 1080, 1920),
            hold: secs(dur).saturating_sub(secs(source)),
        };
        Composition {
            width: 1080,
            height: 1920,
            fps: 30,
            duration: secs(5.0),
            segments: vec![seg(0, 0.0, 2.0, 2.0), seg(1, 2.0, 3.0, 1.5)],
            audio,
        }
    }

    fn still_job(filters: Vec<FilterSpec>) -> StillSegmentJob {
        StillSegmentJob {
            index: 0,
            image: PathBuf::from("a.jpg"),
            source_width: 1920,
            source_height: 1080,
            fit: aspect_fit(1920, 1080, 1080, 1920),
            duration: secs(2.0),
            filters,
            transform: Transform2D::IDENTITY,
            motion: None,
            config: config(),
            output: PathBuf::from("seg.mp4"),
        }
    }

    #[test]
    fn test_still_graph() {
        let graph = still_segment_graph(&still_job(vec![FilterSpec::new("grayscale")])).unwrap();
        assert_eq!(graph.total_frames, 60);
        assert_eq!(graph.inputs, vec![InputSpec::LoopedImage(PathBuf::from("a.jpg"))]);
        assert!(graph
            .filter_complex
            .starts_with("[0:v]scale=1080:608:flags=lanczos,setsar=1,hue=s=0,format=rgba[fg]"));
        assert!(graph.filter_complex.contains("overlay=x='(W-w)/2+0':y='(H-h)/2+0'"));
    }

    #[test]
    fn test_still_graph_rejects_unknown_filter() {
        assert!(still_segment_graph(&still_job(vec![FilterSpec::new("glitter")])).is_err());
    }

    #[test]
    fn test_export_graph_concat_and_hold() {
        let job = ExportJob {
            composition: composition(None),
            layers: vec![],
            config: config(),
            output: PathBuf::from("out.mp4"),
        };
        let graph = export_graph(&job);
        assert_eq!(graph.inputs.len(), 2);
        assert!(graph.filter_complex.contains("[s0][s1]concat=n=2:v=1:a=0[base]"));
        assert!(graph
            .filter_complex
            .contains("tpad=stop_mode=clone:stop_duration=1.500000"));
        assert!(graph.filter_complex.contains("trim=duration=1.500000"));
        assert!(graph.filter_complex.ends_with("[base]format=yuv420p[vout]"));
        assert_eq!(graph.audio_label, None);
        assert_eq!(graph.total_frames, 150);
    }

    fn audio_job(source_secs: f64) -> ExportJob {
        let source = secs(source_secs);
        let audio = AudioTrack {
            path: PathBuf::from("music.m4a"),
            volume: 0.8,
            source_duration: source,
            loops: plan_audio_loops(source, secs(5.0)).unwrap(),
        };
        ExportJob {
            composition: composition(Some(audio)),
            layers: vec![],
            config: config(),
            output: PathBuf::from("out.mp4"),
        }
    }

    #[test]
    fn test_export_graph_loops_audio() {
        let graph = export_graph(&audio_job(2.0));
        assert_eq!(
            graph.inputs[2],
            InputSpec::LoopedAudio(PathBuf::from("music.m4a"))
        );
        assert!(graph
            .filter_complex
            .ends_with("[2:a]atrim=duration=5.000000,asetpts=PTS-STARTPTS,volume=0.800[aout]"));
        assert_eq!(graph.audio_label.as_deref(), Some("[aout]"));
    }

    #[test]
    fn test_long_audio_is_read_once() {
        let graph = export_graph(&audio_job(30.0));
        assert_eq!(graph.inputs[2], InputSpec::File(PathBuf::from("music.m4a")));
        assert!(graph.filter_complex.contains("atrim=duration=5.000000"));
    }

    #[test]
    fn test_audio_graph_size_is_independent_of_loop_count() {
        let few = export_graph(&audio_job(2.0));
        let many = export_graph(&audio_job(0.001));
        assert_eq!(many.filter_complex, few.filter_complex);
        assert_eq!(many.inputs, few.inputs);
    }

    #[test]
    fn test_overlay_enable_window() {
        let config = config();
        let layer = OverlayLayerFactory::new(&config).build(
            0,
            &Overlay::caption(2.0, 1.0, "Crispy!"),
            secs(5.0),
        );
        let job = ExportJob {
            composition: composition(None),
            layers: vec![layer],
            config: config.clone(),
            output: PathBuf::from("out.mp4"),
        };
        let graph = export_graph(&job);
        assert!(graph.filter_complex.contains("[base]drawtext=text='Crispy!'"));
        assert!(graph
            .filter_complex
            .contains("enable='gte(t,2.000000)*lt(t,3.000000)'[o0]"));
        assert!(graph.filter_complex.ends_with("[o0]format=yuv420p[vout]"));
    }
}
