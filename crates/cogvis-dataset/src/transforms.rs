//! Declarative preprocessing pipelines.
//!
//! A pipeline is described as an ordered list of `(name, args)` pairs, for
//! example `Resize(70)`, `CenterCrop(64)`, `ToTensor()`. Every step is
//! resolved against a static catalog and validated when the pipeline is
//! built, so applying a pipeline to a sample can only fail on the sample
//! itself (e.g. an image smaller than a random crop).

use std::fmt;

use cogvis_core::{Error, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::augmentation;

/// A positional transform argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformArg {
    Int(i64),
    Float(f64),
    Seq(Vec<f64>),
}

impl From<i64> for TransformArg {
    fn from(value: i64) -> Self {
        TransformArg::Int(value)
    }
}

impl From<u32> for TransformArg {
    fn from(value: u32) -> Self {
        TransformArg::Int(value as i64)
    }
}

impl From<f64> for TransformArg {
    fn from(value: f64) -> Self {
        TransformArg::Float(value)
    }
}

impl From<Vec<f64>> for TransformArg {
    fn from(value: Vec<f64>) -> Self {
        TransformArg::Seq(value)
    }
}

/// One declarative pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<TransformArg>,
}

impl TransformSpec {
    pub fn new(name: impl Into<String>, args: Vec<TransformArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// What a pipeline step consumes and produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Image,
    Tensor,
}

impl SampleKind {
    fn as_str(self) -> &'static str {
        match self {
            SampleKind::Image => "image",
            SampleKind::Tensor => "tensor",
        }
    }
}

/// A channel-first float image, `[C, H, W]`
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSample {
    pub data: Vec<f32>,
    pub shape: [usize; 3],
}

impl TensorSample {
    /// Converts to CHW floats in `[0, 1]`; 8-bit grayscale gives one channel, anything else three
    pub fn from_image(image: &DynamicImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);

        if let DynamicImage::ImageLuma8(gray) = image {
            let data = gray.pixels().map(|p| p[0] as f32 / 255.0).collect();
            return Self {
                data,
                shape: [1, height, width],
            };
        }

        let rgb = image.to_rgb8();
        let plane = height * width;
        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                data[c * plane + offset] = pixel[c] as f32 / 255.0;
            }
        }

        Self {
            data,
            shape: [3, height, width],
        }
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }
}

/// A sample flowing through a pipeline
#[derive(Debug, Clone)]
pub enum Sample {
    Image(DynamicImage),
    Tensor(TensorSample),
}

impl Sample {
    pub fn kind(&self) -> SampleKind {
        match self {
            Sample::Image(_) => SampleKind::Image,
            Sample::Tensor(_) => SampleKind::Tensor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResizeTo {
    /// Match the shorter edge, keep the aspect ratio
    ShorterEdge(u32),
    Exact { height: u32, width: u32 },
}

#[derive(Debug, Clone, PartialEq)]
enum Transform {
    Resize(ResizeTo),
    CenterCrop { height: u32, width: u32 },
    RandomCrop { height: u32, width: u32 },
    RandomHorizontalFlip(f64),
    RandomVerticalFlip(f64),
    Grayscale { channels: usize },
    ColorJitter { brightness: f32, contrast: f32, saturation: f32 },
    ToTensor,
    Normalize { mean: Vec<f32>, std: Vec<f32> },
}

type Constructor = fn(&[TransformArg]) -> Result<Transform>;

const CATALOG: &[(&str, Constructor)] = &[
    ("Resize", build_resize),
    ("CenterCrop", build_center_crop),
    ("RandomCrop", build_random_crop),
    ("RandomHorizontalFlip", build_horizontal_flip),
    ("RandomVerticalFlip", build_vertical_flip),
    ("Grayscale", build_grayscale),
    ("ColorJitter", build_color_jitter),
    ("ToTensor", build_to_tensor),
    ("Normalize", build_normalize),
];

/// Names accepted by [`TransformPipeline::build`]
pub fn catalog() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|(name, _)| *name)
}

fn lookup(name: &str) -> Option<Constructor> {
    CATALOG
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, constructor)| *constructor)
}

fn positive_dim(transform: &str, value: f64) -> Result<u32> {
    if value.fract() != 0.0 || value < 1.0 || value > u32::MAX as f64 {
        return Err(Error::invalid_args(
            transform,
            format!("expected a positive integer size, got {value}"),
        ));
    }
    Ok(value as u32)
}

enum SizeArg {
    Single(u32),
    Pair(u32, u32),
}

fn size_args(transform: &str, args: &[TransformArg]) -> Result<SizeArg> {
    match args {
        [TransformArg::Int(size)] => Ok(SizeArg::Single(positive_dim(transform, *size as f64)?)),
        [TransformArg::Seq(dims)] if dims.len() == 1 => {
            Ok(SizeArg::Single(positive_dim(transform, dims[0])?))
        }
        [TransformArg::Seq(dims)] if dims.len() == 2 => Ok(SizeArg::Pair(
            positive_dim(transform, dims[0])?,
            positive_dim(transform, dims[1])?,
        )),
        [TransformArg::Int(h), TransformArg::Int(w)] => Ok(SizeArg::Pair(
            positive_dim(transform, *h as f64)?,
            positive_dim(transform, *w as f64)?,
        )),
        _ => Err(Error::invalid_args(
            transform,
            format!("expected a size or a (height, width) pair, got {args:?}"),
        )),
    }
}

fn square_or_pair(transform: &str, args: &[TransformArg]) -> Result<(u32, u32)> {
    Ok(match size_args(transform, args)? {
        SizeArg::Single(size) => (size, size),
        SizeArg::Pair(height, width) => (height, width),
    })
}

fn scalar(transform: &str, arg: &TransformArg) -> Result<f64> {
    match arg {
        TransformArg::Int(v) => Ok(*v as f64),
        TransformArg::Float(v) => Ok(*v),
        TransformArg::Seq(_) => Err(Error::invalid_args(
            transform,
            "expected a number, got a sequence",
        )),
    }
}

fn vector(transform: &str, arg: &TransformArg) -> Result<Vec<f32>> {
    match arg {
        TransformArg::Seq(values) if !values.is_empty() => {
            Ok(values.iter().map(|v| *v as f32).collect())
        }
        TransformArg::Seq(_) => Err(Error::invalid_args(transform, "empty sequence")),
        other => Ok(vec![scalar(transform, other)? as f32]),
    }
}

fn probability(transform: &str, args: &[TransformArg]) -> Result<f64> {
    let p = match args {
        [] => 0.5,
        [arg] => scalar(transform, arg)?,
        _ => {
            return Err(Error::invalid_args(
                transform,
                format!("expected at most 1 argument, got {}", args.len()),
            ))
        }
    };
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::invalid_args(
            transform,
            format!("probability must be in [0, 1], got {p}"),
        ));
    }
    Ok(p)
}

fn build_resize(args: &[TransformArg]) -> Result<Transform> {
    Ok(match size_args("Resize", args)? {
        SizeArg::Single(size) => Transform::Resize(ResizeTo::ShorterEdge(size)),
        SizeArg::Pair(height, width) => Transform::Resize(ResizeTo::Exact { height, width }),
    })
}

fn build_center_crop(args: &[TransformArg]) -> Result<Transform> {
    let (height, width) = square_or_pair("CenterCrop", args)?;
    Ok(Transform::CenterCrop { height, width })
}

fn build_random_crop(args: &[TransformArg]) -> Result<Transform> {
    let (height, width) = square_or_pair("RandomCrop", args)?;
    Ok(Transform::RandomCrop { height, width })
}

fn build_horizontal_flip(args: &[TransformArg]) -> Result<Transform> {
    Ok(Transform::RandomHorizontalFlip(probability(
        "RandomHorizontalFlip",
        args,
    )?))
}

fn build_vertical_flip(args: &[TransformArg]) -> Result<Transform> {
    Ok(Transform::RandomVerticalFlip(probability(
        "RandomVerticalFlip",
        args,
    )?))
}

fn build_grayscale(args: &[TransformArg]) -> Result<Transform> {
    match args {
        [] | [TransformArg::Int(1)] => Ok(Transform::Grayscale { channels: 1 }),
        [TransformArg::Int(3)] => Ok(Transform::Grayscale { channels: 3 }),
        _ => Err(Error::invalid_args(
            "Grayscale",
            format!("expected an output channel count of 1 or 3, got {args:?}"),
        )),
    }
}

fn build_color_jitter(args: &[TransformArg]) -> Result<Transform> {
    if args.len() > 3 {
        return Err(Error::invalid_args(
            "ColorJitter",
            format!("expected at most 3 arguments, got {}", args.len()),
        ));
    }

    let mut strengths = [0.0f32; 3];
    for (slot, arg) in strengths.iter_mut().zip(args) {
        let value = scalar("ColorJitter", arg)?;
        if value < 0.0 {
            return Err(Error::invalid_args(
                "ColorJitter",
                format!("strengths must be non-negative, got {value}"),
            ));
        }
        *slot = value as f32;
    }

    Ok(Transform::ColorJitter {
        brightness: strengths[0],
        contrast: strengths[1],
        saturation: strengths[2],
    })
}

fn build_to_tensor(args: &[TransformArg]) -> Result<Transform> {
    if !args.is_empty() {
        return Err(Error::invalid_args(
            "ToTensor",
            format!("expected no arguments, got {}", args.len()),
        ));
    }
    Ok(Transform::ToTensor)
}

fn build_normalize(args: &[TransformArg]) -> Result<Transform> {
    let [mean, std] = args else {
        return Err(Error::invalid_args(
            "Normalize",
            format!("expected (means, stds), got {} arguments", args.len()),
        ));
    };

    let mean = vector("Normalize", mean)?;
    let std = vector("Normalize", std)?;

    if mean.len() != std.len() {
        return Err(Error::invalid_args(
            "Normalize",
            format!("{} means but {} stds", mean.len(), std.len()),
        ));
    }
    if std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
        return Err(Error::invalid_args(
            "Normalize",
            "standard deviations must be positive",
        ));
    }

    Ok(Transform::Normalize { mean, std })
}

impl Transform {
    fn name(&self) -> &'static str {
        match self {
            Transform::Resize(_) => "Resize",
            Transform::CenterCrop { .. } => "CenterCrop",
            Transform::RandomCrop { .. } => "RandomCrop",
            Transform::RandomHorizontalFlip(_) => "RandomHorizontalFlip",
            Transform::RandomVerticalFlip(_) => "RandomVerticalFlip",
            Transform::Grayscale { .. } => "Grayscale",
            Transform::ColorJitter { .. } => "ColorJitter",
            Transform::ToTensor => "ToTensor",
            Transform::Normalize { .. } => "Normalize",
        }
    }

    fn input_kind(&self) -> SampleKind {
        match self {
            Transform::Normalize { .. } => SampleKind::Tensor,
            _ => SampleKind::Image,
        }
    }

    fn incompatible(&self, found: SampleKind) -> Error {
        Error::IncompatibleTransform {
            transform: self.name().to_string(),
            expected: self.input_kind().as_str(),
            found: found.as_str(),
        }
    }

    fn apply<R: Rng + ?Sized>(&self, sample: Sample, rng: &mut R) -> Result<Sample> {
        let image = match (self, sample) {
            (Transform::Normalize { mean, std }, Sample::Tensor(tensor)) => {
                return normalize(tensor, mean, std).map(Sample::Tensor)
            }
            (_, Sample::Image(image)) if self.input_kind() == SampleKind::Image => image,
            (_, other) => return Err(self.incompatible(other.kind())),
        };

        let out = match self {
            Transform::Resize(to) => resize(&image, *to)?,
            Transform::CenterCrop { height, width } => center_crop(&image, *height, *width),
            Transform::RandomCrop { height, width } => random_crop(&image, *height, *width, rng)?,
            Transform::RandomHorizontalFlip(p) => {
                if rng.gen_bool(*p) {
                    image.fliph()
                } else {
                    image
                }
            }
            Transform::RandomVerticalFlip(p) => {
                if rng.gen_bool(*p) {
                    image.flipv()
                } else {
                    image
                }
            }
            Transform::Grayscale { channels: 1 } => DynamicImage::ImageLuma8(image.to_luma8()),
            Transform::Grayscale { .. } => {
                DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(image.to_luma8()).to_rgb8())
            }
            Transform::ColorJitter {
                brightness,
                contrast,
                saturation,
            } => augmentation::color_jitter(&image, *brightness, *contrast, *saturation, rng),
            Transform::ToTensor => return Ok(Sample::Tensor(TensorSample::from_image(&image))),
            Transform::Normalize { .. } => return Err(self.incompatible(SampleKind::Image)),
        };

        Ok(Sample::Image(out))
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Resize(ResizeTo::ShorterEdge(size)) => write!(f, "Resize({size})"),
            Transform::Resize(ResizeTo::Exact { height, width }) => {
                write!(f, "Resize({height}, {width})")
            }
            Transform::CenterCrop { height, width } => write!(f, "CenterCrop({height}, {width})"),
            Transform::RandomCrop { height, width } => write!(f, "RandomCrop({height}, {width})"),
            Transform::RandomHorizontalFlip(p) => write!(f, "RandomHorizontalFlip({p})"),
            Transform::RandomVerticalFlip(p) => write!(f, "RandomVerticalFlip({p})"),
            Transform::Grayscale { channels } => write!(f, "Grayscale({channels})"),
            Transform::ColorJitter {
                brightness,
                contrast,
                saturation,
            } => write!(f, "ColorJitter({brightness}, {contrast}, {saturation})"),
            Transform::ToTensor => write!(f, "ToTensor()"),
            Transform::Normalize { mean, std } => write!(f, "Normalize({mean:?}, {std:?})"),
        }
    }
}

fn resize(image: &DynamicImage, to: ResizeTo) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::Image("cannot resize an empty image".to_string()));
    }

    let (new_width, new_height) = match to {
        ResizeTo::Exact { height, width } => (width, height),
        ResizeTo::ShorterEdge(size) if width <= height => {
            let long = (size as f64 * height as f64 / width as f64) as u32;
            (size, long.max(1))
        }
        ResizeTo::ShorterEdge(size) => {
            let long = (size as f64 * width as f64 / height as f64) as u32;
            (long.max(1), size)
        }
    };

    if (new_width, new_height) == (width, height) {
        return Ok(image.clone());
    }
    Ok(image.resize_exact(new_width, new_height, FilterType::Triangle))
}

/// Crops the central region, zero-padding when the image is smaller than the crop
fn center_crop(image: &DynamicImage, crop_height: u32, crop_width: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let left = ((width as f64 - crop_width as f64) / 2.0).round() as i64;
    let top = ((height as f64 - crop_height as f64) / 2.0).round() as i64;

    if left >= 0 && top >= 0 {
        return image.crop_imm(left as u32, top as u32, crop_width, crop_height);
    }

    let mut canvas = DynamicImage::new(crop_width, crop_height, image.color());
    imageops::replace(&mut canvas, image, -left, -top);
    canvas
}

fn random_crop<R: Rng + ?Sized>(
    image: &DynamicImage,
    crop_height: u32,
    crop_width: u32,
    rng: &mut R,
) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if crop_width > width || crop_height > height {
        return Err(Error::Image(format!(
            "RandomCrop of {crop_width}x{crop_height} does not fit a {width}x{height} image"
        )));
    }

    let x = rng.gen_range(0..=width - crop_width);
    let y = rng.gen_range(0..=height - crop_height);
    Ok(image.crop_imm(x, y, crop_width, crop_height))
}

fn normalize(mut tensor: TensorSample, mean: &[f32], std: &[f32]) -> Result<TensorSample> {
    let channels = tensor.channels();
    if mean.len() != 1 && mean.len() != channels {
        return Err(Error::invalid_args(
            "Normalize",
            format!("{} statistics for a {channels}-channel tensor", mean.len()),
        ));
    }

    let plane = tensor.height() * tensor.width();
    for (c, values) in tensor.data.chunks_mut(plane.max(1)).enumerate().take(channels) {
        let idx = if mean.len() == 1 { 0 } else { c };
        let (m, s) = (mean[idx], std[idx]);
        for v in values.iter_mut() {
            *v = (*v - m) / s;
        }
    }

    Ok(tensor)
}

/// An ordered, immutable sequence of validated transforms
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPipeline {
    steps: Vec<Transform>,
    output_channels: usize,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformPipeline {
    /// A pipeline that only converts the image to a tensor
    pub fn identity() -> Self {
        Self {
            steps: Vec::new(),
            output_channels: 3,
        }
    }

    /// Resolves and validates every step, preserving their order.
    ///
    /// Inputs are assumed to be RGB images, which is what the image-folder
    /// dataset produces.
    pub fn build(specs: &[TransformSpec]) -> Result<Self> {
        let mut kind = SampleKind::Image;
        let mut channels = 3;
        let mut steps = Vec::with_capacity(specs.len());

        for spec in specs {
            let constructor =
                lookup(&spec.name).ok_or_else(|| Error::UnknownTransform(spec.name.clone()))?;
            let transform = constructor(&spec.args)?;

            if transform.input_kind() != kind {
                return Err(transform.incompatible(kind));
            }

            match &transform {
                Transform::Grayscale { channels: c } => channels = *c,
                Transform::ToTensor => kind = SampleKind::Tensor,
                Transform::Normalize { mean, .. } if mean.len() != 1 && mean.len() != channels => {
                    return Err(Error::invalid_args(
                        "Normalize",
                        format!("{} statistics for a {channels}-channel tensor", mean.len()),
                    ));
                }
                _ => {}
            }

            steps.push(transform);
        }

        Ok(Self {
            steps,
            output_channels: channels,
        })
    }

    /// Runs every step in order, converting to a tensor at the end if no step did
    pub fn apply<R: Rng + ?Sized>(&self, image: DynamicImage, rng: &mut R) -> Result<TensorSample> {
        let mut sample = Sample::Image(image);
        for step in &self.steps {
            sample = step.apply(sample, rng)?;
        }

        Ok(match sample {
            Sample::Image(image) => TensorSample::from_image(&image),
            Sample::Tensor(tensor) => tensor,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Catalog names of the steps, in application order
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(Transform::name).collect()
    }

    /// Channels of the tensors produced for RGB input
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }
}

impl fmt::Display for TransformPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "ToTensor()");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn spec(name: &str, args: Vec<TransformArg>) -> TransformSpec {
        TransformSpec::new(name, args)
    }

    fn demo_specs() -> Vec<TransformSpec> {
        vec![
            spec("Resize", vec![70i64.into()]),
            spec("CenterCrop", vec![64i64.into()]),
            spec("ToTensor", vec![]),
        ]
    }

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        }))
    }

    #[test]
    fn test_resize_crop_to_tensor_shape() {
        let pipeline = TransformPipeline::build(&demo_specs()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        for (w, h) in [(64, 64), (100, 70), (33, 250), (640, 480), (7, 5)] {
            let tensor = pipeline.apply(gradient_image(w, h), &mut rng).unwrap();
            assert_eq!(tensor.shape, [3, 64, 64], "input {w}x{h}");
            assert_eq!(tensor.data.len(), 3 * 64 * 64);
            assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let pipeline = TransformPipeline::build(&[
            spec("RandomHorizontalFlip", vec![]),
            spec("Resize", vec![32i64.into(), 48i64.into()]),
            spec("ToTensor", vec![]),
            spec("Normalize", vec![vec![0.5].into(), vec![0.5].into()]),
        ])
        .unwrap();

        assert_eq!(
            pipeline.step_names(),
            vec!["RandomHorizontalFlip", "Resize", "ToTensor", "Normalize"]
        );
        assert_eq!(
            pipeline.to_string(),
            "RandomHorizontalFlip(0.5) -> Resize(32, 48) -> ToTensor() -> Normalize([0.5], [0.5])"
        );
    }

    #[test]
    fn test_unknown_transform() {
        let err = TransformPipeline::build(&[spec("Posterize", vec![])]).unwrap_err();
        assert!(matches!(err, Error::UnknownTransform(ref n) if n == "Posterize"));
    }

    #[test]
    fn test_invalid_arguments() {
        let cases = vec![
            spec("Resize", vec![]),
            spec("Resize", vec![0i64.into()]),
            spec("Resize", vec![1i64.into(), 2i64.into(), 3i64.into()]),
            spec("CenterCrop", vec![64.5.into()]),
            spec("ToTensor", vec![1i64.into()]),
            spec("RandomHorizontalFlip", vec![1.5.into()]),
            spec("Grayscale", vec![2i64.into()]),
            spec("ColorJitter", vec![(-0.1).into()]),
            spec("Normalize", vec![vec![0.5, 0.5].into()]),
            spec("Normalize", vec![vec![0.5, 0.5].into(), vec![0.2].into()]),
            spec("Normalize", vec![vec![0.5].into(), vec![0.0].into()]),
        ];

        for case in cases {
            let err = TransformPipeline::build(&[case.clone()]).unwrap_err();
            assert!(
                matches!(err, Error::InvalidTransformArgs { .. }),
                "{case:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_image_step_after_to_tensor_is_rejected() {
        let err = TransformPipeline::build(&[
            spec("ToTensor", vec![]),
            spec("Resize", vec![32i64.into()]),
        ])
        .unwrap_err();

        assert!(matches!(
            err,
            Error::IncompatibleTransform {
                expected: "image",
                found: "tensor",
                ..
            }
        ));

        let err = TransformPipeline::build(&[spec(
            "Normalize",
            vec![vec![0.5].into(), vec![0.5].into()],
        )])
        .unwrap_err();
        assert!(matches!(err, Error::IncompatibleTransform { .. }));
    }

    #[test]
    fn test_normalize_must_match_channels() {
        let err = TransformPipeline::build(&[
            spec("Grayscale", vec![]),
            spec("ToTensor", vec![]),
            spec("Normalize", vec![vec![0.5; 3].into(), vec![0.2; 3].into()]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTransformArgs { .. }));
    }

    #[test]
    fn test_normalize_values() {
        let pipeline = TransformPipeline::build(&[
            spec("ToTensor", vec![]),
            spec(
                "Normalize",
                vec![vec![0.0, 0.5, 1.0].into(), vec![1.0, 0.5, 0.25].into()],
            ),
        ])
        .unwrap();
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(2, 2, Rgb([255u8, 255, 255])));
        let tensor = pipeline.apply(image, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();

        assert_eq!(&tensor.data[0..4], &[1.0; 4]);
        assert_eq!(&tensor.data[4..8], &[1.0; 4]);
        assert_eq!(&tensor.data[8..12], &[0.0; 4]);
    }

    #[test]
    fn test_grayscale_channels() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let one = TransformPipeline::build(&[spec("Grayscale", vec![])]).unwrap();
        assert_eq!(one.output_channels(), 1);
        assert_eq!(one.apply(gradient_image(5, 4), &mut rng).unwrap().shape, [1, 4, 5]);

        let three = TransformPipeline::build(&[spec("Grayscale", vec![3i64.into()])]).unwrap();
        let tensor = three.apply(gradient_image(5, 4), &mut rng).unwrap();
        assert_eq!(tensor.shape, [3, 4, 5]);
        assert_eq!(tensor.data[0..20], tensor.data[20..40]);
    }

    #[test]
    fn test_shorter_edge_resize_keeps_aspect() {
        let pipeline = TransformPipeline::build(&[spec("Resize", vec![50i64.into()])]).unwrap();
        let tensor = pipeline
            .apply(gradient_image(200, 100), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        assert_eq!(tensor.shape, [3, 50, 100]);
    }

    #[test]
    fn test_center_crop_pads_small_images() {
        let pipeline = TransformPipeline::build(&[spec("CenterCrop", vec![8i64.into()])]).unwrap();
        let white = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(4, 4, Rgb([255u8, 255, 255])));
        let tensor = pipeline.apply(white, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();

        assert_eq!(tensor.shape, [3, 8, 8]);
        assert_eq!(tensor.data[0], 0.0);
        assert_eq!(tensor.data[2 * 8 + 2], 1.0);
    }

    #[test]
    fn test_random_steps_are_seeded() {
        let pipeline = TransformPipeline::build(&[
            spec("RandomCrop", vec![16i64.into()]),
            spec("ColorJitter", vec![0.3.into(), 0.3.into(), 0.3.into()]),
        ])
        .unwrap();

        let a = pipeline
            .apply(gradient_image(40, 40), &mut ChaCha8Rng::seed_from_u64(11))
            .unwrap();
        let b = pipeline
            .apply(gradient_image(40, 40), &mut ChaCha8Rng::seed_from_u64(11))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape, [3, 16, 16]);
    }

    #[test]
    fn test_random_crop_larger_than_image_fails() {
        let pipeline = TransformPipeline::build(&[spec("RandomCrop", vec![64i64.into()])]).unwrap();
        let err = pipeline
            .apply(gradient_image(10, 10), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_certain_flip() {
        let pipeline = TransformPipeline::build(&[spec("RandomHorizontalFlip", vec![1.0.into()])])
            .unwrap();
        let tensor = pipeline
            .apply(gradient_image(4, 1), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        let red: Vec<f32> = tensor.data[0..4].iter().map(|v| (v * 255.0).round()).collect();
        assert_eq!(red, vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_specs_deserialize_from_json() {
        let specs: Vec<TransformSpec> = serde_json::from_str(
            r#"[
                {"name": "Resize", "args": [70]},
                {"name": "CenterCrop", "args": [64]},
                {"name": "ToTensor"},
                {"name": "Normalize", "args": [[0.5, 0.5, 0.5], [0.25, 0.25, 0.25]]}
            ]"#,
        )
        .unwrap();

        assert_eq!(specs[0].args, vec![TransformArg::Int(70)]);
        assert!(specs[2].args.is_empty());
        let pipeline = TransformPipeline::build(&specs).unwrap();
        assert_eq!(pipeline.len(), 4);
    }

    #[test]
    fn test_identity_pipeline() {
        let pipeline = TransformPipeline::default();
        assert!(pipeline.is_empty());
        let tensor = pipeline
            .apply(gradient_image(3, 2), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        assert_eq!(tensor.shape, [3, 2, 3]);
        assert!(catalog().any(|name| name == "ColorJitter"));
    }
}
