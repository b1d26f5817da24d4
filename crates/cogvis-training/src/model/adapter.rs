//! Head replacement for ImageNet backbones.
//!
//! An architecture name is resolved once to an [`Architecture`], which knows its
//! [`ArchitectureFamily`] and therefore where the classification head lives.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use cogvis_core::{Error, Result};
use tracing::{debug, info};

use super::zoo::{
    densenet::DenseNetLayout, squeezenet::SqueezeNetVersion, vgg::VggDepth, AlexNet, DenseNet,
    ResNet, SqueezeNet, Vgg,
};
use super::ImageClassifier;
use crate::checkpoint::ModelRecorder;

/// Backbone family, detected by substring of the architecture name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchitectureFamily {
    ResNet,
    AlexNet,
    Vgg,
    SqueezeNet,
    DenseNet,
}

impl ArchitectureFamily {
    const PATTERNS: [(&'static str, ArchitectureFamily); 5] = [
        ("resnet", ArchitectureFamily::ResNet),
        ("alexnet", ArchitectureFamily::AlexNet),
        ("vgg", ArchitectureFamily::Vgg),
        ("squeezenet", ArchitectureFamily::SqueezeNet),
        ("densenet", ArchitectureFamily::DenseNet),
    ];

    /// Family whose pattern occurs in `name`, if any
    pub fn detect(name: &str) -> Option<Self> {
        Self::PATTERNS
            .iter()
            .find(|(pattern, _)| name.contains(pattern))
            .map(|(_, family)| *family)
    }

    /// Location of the replaced layer in the reference layout
    pub fn head_path(&self) -> &'static str {
        match self {
            ArchitectureFamily::ResNet => "fc",
            ArchitectureFamily::AlexNet | ArchitectureFamily::Vgg => "classifier.6",
            ArchitectureFamily::SqueezeNet => "classifier.1",
            ArchitectureFamily::DenseNet => "classifier",
        }
    }
}

impl fmt::Display for ArchitectureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchitectureFamily::ResNet => "ResNet",
            ArchitectureFamily::AlexNet => "AlexNet",
            ArchitectureFamily::Vgg => "VGG",
            ArchitectureFamily::SqueezeNet => "SqueezeNet",
            ArchitectureFamily::DenseNet => "DenseNet",
        };
        write!(f, "{name}")
    }
}

/// A concrete architecture from the zoo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    ResNet18,
    ResNet34,
    ResNet50,
    ResNet101,
    ResNet152,
    AlexNet,
    Vgg11,
    Vgg11Bn,
    Vgg13,
    Vgg13Bn,
    Vgg16,
    Vgg16Bn,
    Vgg19,
    Vgg19Bn,
    SqueezeNet1_0,
    SqueezeNet1_1,
    DenseNet121,
    DenseNet161,
    DenseNet169,
    DenseNet201,
}

impl Architecture {
    pub const ALL: [Architecture; 20] = [
        Architecture::ResNet18,
        Architecture::ResNet34,
        Architecture::ResNet50,
        Architecture::ResNet101,
        Architecture::ResNet152,
        Architecture::AlexNet,
        Architecture::Vgg11,
        Architecture::Vgg11Bn,
        Architecture::Vgg13,
        Architecture::Vgg13Bn,
        Architecture::Vgg16,
        Architecture::Vgg16Bn,
        Architecture::Vgg19,
        Architecture::Vgg19Bn,
        Architecture::SqueezeNet1_0,
        Architecture::SqueezeNet1_1,
        Architecture::DenseNet121,
        Architecture::DenseNet161,
        Architecture::DenseNet169,
        Architecture::DenseNet201,
    ];

    /// Canonical lowercase name, also the pretrained weights file stem
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::ResNet18 => "resnet18",
            Architecture::ResNet34 => "resnet34",
            Architecture::ResNet50 => "resnet50",
            Architecture::ResNet101 => "resnet101",
            Architecture::ResNet152 => "resnet152",
            Architecture::AlexNet => "alexnet",
            Architecture::Vgg11 => "vgg11",
            Architecture::Vgg11Bn => "vgg11_bn",
            Architecture::Vgg13 => "vgg13",
            Architecture::Vgg13Bn => "vgg13_bn",
            Architecture::Vgg16 => "vgg16",
            Architecture::Vgg16Bn => "vgg16_bn",
            Architecture::Vgg19 => "vgg19",
            Architecture::Vgg19Bn => "vgg19_bn",
            Architecture::SqueezeNet1_0 => "squeezenet1_0",
            Architecture::SqueezeNet1_1 => "squeezenet1_1",
            Architecture::DenseNet121 => "densenet121",
            Architecture::DenseNet161 => "densenet161",
            Architecture::DenseNet169 => "densenet169",
            Architecture::DenseNet201 => "densenet201",
        }
    }

    pub fn family(&self) -> ArchitectureFamily {
        match self {
            Architecture::ResNet18
            | Architecture::ResNet34
            | Architecture::ResNet50
            | Architecture::ResNet101
            | Architecture::ResNet152 => ArchitectureFamily::ResNet,
            Architecture::AlexNet => ArchitectureFamily::AlexNet,
            Architecture::Vgg11
            | Architecture::Vgg11Bn
            | Architecture::Vgg13
            | Architecture::Vgg13Bn
            | Architecture::Vgg16
            | Architecture::Vgg16Bn
            | Architecture::Vgg19
            | Architecture::Vgg19Bn => ArchitectureFamily::Vgg,
            Architecture::SqueezeNet1_0 | Architecture::SqueezeNet1_1 => {
                ArchitectureFamily::SqueezeNet
            }
            Architecture::DenseNet121
            | Architecture::DenseNet161
            | Architecture::DenseNet169
            | Architecture::DenseNet201 => ArchitectureFamily::DenseNet,
        }
    }

    /// Builds the architecture with its 1000-class ImageNet head
    pub fn build<B: Backend>(&self, device: &B::Device) -> AdaptedModel<B> {
        match self {
            Architecture::ResNet18 => ResNet::<B>::resnet18(device).into(),
            Architecture::ResNet34 => ResNet::<B>::resnet34(device).into(),
            Architecture::ResNet50 => ResNet::<B>::resnet50(device).into(),
            Architecture::ResNet101 => ResNet::<B>::resnet101(device).into(),
            Architecture::ResNet152 => ResNet::<B>::resnet152(device).into(),
            Architecture::AlexNet => AlexNet::<B>::new(device).into(),
            Architecture::Vgg11 => Vgg::<B>::new(VggDepth::D11, false, device).into(),
            Architecture::Vgg11Bn => Vgg::<B>::new(VggDepth::D11, true, device).into(),
            Architecture::Vgg13 => Vgg::<B>::new(VggDepth::D13, false, device).into(),
            Architecture::Vgg13Bn => Vgg::<B>::new(VggDepth::D13, true, device).into(),
            Architecture::Vgg16 => Vgg::<B>::new(VggDepth::D16, false, device).into(),
            Architecture::Vgg16Bn => Vgg::<B>::new(VggDepth::D16, true, device).into(),
            Architecture::Vgg19 => Vgg::<B>::new(VggDepth::D19, false, device).into(),
            Architecture::Vgg19Bn => Vgg::<B>::new(VggDepth::D19, true, device).into(),
            Architecture::SqueezeNet1_0 => SqueezeNet::<B>::new(SqueezeNetVersion::V1_0, device).into(),
            Architecture::SqueezeNet1_1 => SqueezeNet::<B>::new(SqueezeNetVersion::V1_1, device).into(),
            Architecture::DenseNet121 => DenseNet::<B>::new(DenseNetLayout::D121, device).into(),
            Architecture::DenseNet161 => DenseNet::<B>::new(DenseNetLayout::D161, device).into(),
            Architecture::DenseNet169 => DenseNet::<B>::new(DenseNetLayout::D169, device).into(),
            Architecture::DenseNet201 => DenseNet::<B>::new(DenseNetLayout::D201, device).into(),
        }
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();

        let family = ArchitectureFamily::detect(&name)
            .ok_or_else(|| Error::UnsupportedArchitecture(s.to_string()))?;

        Self::ALL
            .into_iter()
            .find(|arch| arch.name() == name)
            .ok_or_else(|| {
                Error::UnsupportedArchitecture(format!("{s} (no such {family} variant)"))
            })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A zoo backbone with (possibly) replaced head
#[derive(Module, Debug)]
pub enum AdaptedModel<B: Backend> {
    ResNet(ResNet<B>),
    AlexNet(AlexNet<B>),
    Vgg(Vgg<B>),
    SqueezeNet(SqueezeNet<B>),
    DenseNet(DenseNet<B>),
}

impl<B: Backend> AdaptedModel<B> {
    pub fn family(&self) -> ArchitectureFamily {
        match self {
            AdaptedModel::ResNet(_) => ArchitectureFamily::ResNet,
            AdaptedModel::AlexNet(_) => ArchitectureFamily::AlexNet,
            AdaptedModel::Vgg(_) => ArchitectureFamily::Vgg,
            AdaptedModel::SqueezeNet(_) => ArchitectureFamily::SqueezeNet,
            AdaptedModel::DenseNet(_) => ArchitectureFamily::DenseNet,
        }
    }

    /// Swaps the layer at the family's head path for a fresh one with
    /// `num_classes` outputs and the same input width
    pub fn replace_head(self, num_classes: usize, device: &B::Device) -> Self {
        match self {
            AdaptedModel::ResNet(m) => m.replace_head(num_classes, device).into(),
            AdaptedModel::AlexNet(m) => m.replace_head(num_classes, device).into(),
            AdaptedModel::Vgg(m) => m.replace_head(num_classes, device).into(),
            AdaptedModel::SqueezeNet(m) => m.replace_head(num_classes, device).into(),
            AdaptedModel::DenseNet(m) => m.replace_head(num_classes, device).into(),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for AdaptedModel<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            AdaptedModel::ResNet(m) => m.forward(images),
            AdaptedModel::AlexNet(m) => m.forward(images),
            AdaptedModel::Vgg(m) => m.forward(images),
            AdaptedModel::SqueezeNet(m) => m.forward(images),
            AdaptedModel::DenseNet(m) => m.forward(images),
        }
    }
}

impl<B: Backend> From<ResNet<B>> for AdaptedModel<B> {
    fn from(model: ResNet<B>) -> Self {
        AdaptedModel::ResNet(model)
    }
}

impl<B: Backend> From<AlexNet<B>> for AdaptedModel<B> {
    fn from(model: AlexNet<B>) -> Self {
        AdaptedModel::AlexNet(model)
    }
}

impl<B: Backend> From<Vgg<B>> for AdaptedModel<B> {
    fn from(model: Vgg<B>) -> Self {
        AdaptedModel::Vgg(model)
    }
}

impl<B: Backend> From<SqueezeNet<B>> for AdaptedModel<B> {
    fn from(model: SqueezeNet<B>) -> Self {
        AdaptedModel::SqueezeNet(model)
    }
}

impl<B: Backend> From<DenseNet<B>> for AdaptedModel<B> {
    fn from(model: DenseNet<B>) -> Self {
        AdaptedModel::DenseNet(model)
    }
}

/// Builds zoo backbones and fits them to a new label set
#[derive(Debug, Clone)]
pub struct ModelAdapter {
    weights_dir: PathBuf,
}

impl Default for ModelAdapter {
    fn default() -> Self {
        Self::new("weights")
    }
}

impl ModelAdapter {
    /// Pretrained records are read from `<weights_dir>/<architecture>.mpk`
    pub fn new(weights_dir: impl Into<PathBuf>) -> Self {
        Self {
            weights_dir: weights_dir.into(),
        }
    }

    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    /// Path of the pretrained record for `arch`, without the recorder extension
    pub fn weights_path(&self, arch: Architecture) -> PathBuf {
        self.weights_dir.join(arch.name())
    }

    /// Resolve `name`, optionally load ImageNet weights, optionally freeze the
    /// backbone, then replace the head with `num_classes` outputs.
    ///
    /// Freezing happens before the replacement, so the new head is the only
    /// trainable part of a frozen model.
    pub fn adapt<B: Backend>(
        &self,
        name: &str,
        num_classes: usize,
        pretrained: bool,
        freeze_backbone: bool,
        device: &B::Device,
    ) -> Result<AdaptedModel<B>> {
        let arch: Architecture = name.parse()?;
        if num_classes == 0 {
            return Err(Error::Config("num_classes must be positive".to_string()));
        }

        let mut model = arch.build::<B>(device);
        if pretrained {
            model = self.load_pretrained(arch, model, device)?;
        }

        if freeze_backbone {
            debug!("Freezing {} backbone parameters", arch);
            model = model.no_grad();
        }

        let model = model.replace_head(num_classes, device);
        info!(
            "Adapted {} to {} classes (head: {}, pretrained: {}, frozen backbone: {})",
            arch,
            num_classes,
            arch.family().head_path(),
            pretrained,
            freeze_backbone
        );

        Ok(model)
    }

    fn load_pretrained<B: Backend>(
        &self,
        arch: Architecture,
        model: AdaptedModel<B>,
        device: &B::Device,
    ) -> Result<AdaptedModel<B>> {
        let path = self.weights_path(arch);
        let file = path.with_extension("mpk");
        if !file.is_file() {
            return Err(Error::PretrainedWeights(format!(
                "no weights for {} at {}",
                arch,
                file.display()
            )));
        }

        info!("Loading pretrained {} weights from {:?}", arch, file);
        model
            .load_file(path, &ModelRecorder::new(), device)
            .map_err(|e| Error::PretrainedWeights(format!("{}: {:?}", file.display(), e)))
    }
}

/// [`ModelAdapter::adapt`] with the default weights directory
pub fn adapt<B: Backend>(
    name: &str,
    num_classes: usize,
    pretrained: bool,
    freeze_backbone: bool,
    device: &B::Device,
) -> Result<AdaptedModel<B>> {
    ModelAdapter::default().adapt(name, num_classes, pretrained, freeze_backbone, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_family_detection() {
        assert_eq!(ArchitectureFamily::detect("resnet50"), Some(ArchitectureFamily::ResNet));
        assert_eq!(ArchitectureFamily::detect("alexnet"), Some(ArchitectureFamily::AlexNet));
        assert_eq!(ArchitectureFamily::detect("vgg16_bn"), Some(ArchitectureFamily::Vgg));
        assert_eq!(
            ArchitectureFamily::detect("squeezenet1_1"),
            Some(ArchitectureFamily::SqueezeNet)
        );
        assert_eq!(ArchitectureFamily::detect("densenet121"), Some(ArchitectureFamily::DenseNet));
        assert_eq!(ArchitectureFamily::detect("inception_v3"), None);
    }

    #[test]
    fn test_head_paths() {
        assert_eq!(ArchitectureFamily::ResNet.head_path(), "fc");
        assert_eq!(ArchitectureFamily::AlexNet.head_path(), "classifier.6");
        assert_eq!(ArchitectureFamily::Vgg.head_path(), "classifier.6");
        assert_eq!(ArchitectureFamily::SqueezeNet.head_path(), "classifier.1");
        assert_eq!(ArchitectureFamily::DenseNet.head_path(), "classifier");
    }

    #[test]
    fn test_every_architecture_parses_from_its_name() {
        for arch in Architecture::ALL {
            assert_eq!(arch.name().parse::<Architecture>().unwrap(), arch);
            assert_eq!(ArchitectureFamily::detect(arch.name()), Some(arch.family()));
        }
        assert_eq!(" ResNet18 ".parse::<Architecture>().unwrap(), Architecture::ResNet18);
    }

    #[test]
    fn test_unknown_architectures_are_rejected() {
        for name in ["not-a-real-arch", "inception_v3", "resnet7", "vgg"] {
            let result = name.parse::<Architecture>();
            assert!(
                matches!(result, Err(Error::UnsupportedArchitecture(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_adapt_rejects_unknown_architecture() {
        let device = Default::default();
        let result = adapt::<TestBackend>("not-a-real-arch", 5, false, true, &device);
        assert!(matches!(result, Err(Error::UnsupportedArchitecture(_))));
    }

    #[test]
    fn test_adapt_resnet18_trains_only_the_head() {
        let device = Default::default();
        let model = adapt::<TestAutodiffBackend>("resnet18", 5, false, true, &device).unwrap();

        let AdaptedModel::ResNet(resnet) = &model else {
            panic!("expected a ResNet");
        };
        assert!(!resnet.conv1.weight.is_require_grad());
        assert!(!resnet.bn1.gamma.is_require_grad());
        assert!(resnet.fc.weight.is_require_grad());
        assert_eq!(resnet.fc.weight.dims(), [512, 5]);

        let output = model.forward(Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(output.dims(), [2, 5]);
    }

    #[test]
    fn test_adapt_without_freezing_keeps_backbone_trainable() {
        let device = Default::default();
        let model = adapt::<TestAutodiffBackend>("resnet18", 3, false, false, &device).unwrap();

        let AdaptedModel::ResNet(resnet) = &model else {
            panic!("expected a ResNet");
        };
        assert!(resnet.conv1.weight.is_require_grad());
        assert!(resnet.fc.weight.is_require_grad());
    }

    #[test]
    fn test_adapt_squeezenet_replaces_final_conv() {
        let device = Default::default();
        let model = adapt::<TestBackend>("squeezenet1_1", 4, false, true, &device).unwrap();
        assert_eq!(model.family(), ArchitectureFamily::SqueezeNet);

        let output = model.forward(Tensor::zeros([1, 3, 64, 64], &device));
        assert_eq!(output.dims(), [1, 4]);
    }

    #[test]
    fn test_adapt_alexnet_replaces_classifier_6() {
        let device = Default::default();
        let model = adapt::<TestBackend>("alexnet", 3, false, true, &device).unwrap();

        let AdaptedModel::AlexNet(alexnet) = &model else {
            panic!("expected an AlexNet");
        };
        assert_eq!(alexnet.classifier.fc3.weight.dims(), [4096, 3]);
        assert_eq!(alexnet.classifier.fc2.weight.dims(), [4096, 4096]);

        let output = model.forward(Tensor::zeros([1, 3, 64, 64], &device));
        assert_eq!(output.dims(), [1, 3]);
    }

    #[test]
    fn test_adapt_vgg11_replaces_classifier_6() {
        let device = Default::default();
        let model = adapt::<TestBackend>("vgg11", 3, false, false, &device).unwrap();
        assert_eq!(model.family(), ArchitectureFamily::Vgg);

        let AdaptedModel::Vgg(vgg) = &model else {
            panic!("expected a VGG");
        };
        assert_eq!(vgg.classifier.fc3.weight.dims(), [4096, 3]);

        let output = model.forward(Tensor::zeros([1, 3, 64, 64], &device));
        assert_eq!(output.dims(), [1, 3]);
    }

    #[test]
    fn test_missing_pretrained_weights() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = ModelAdapter::new(temp_dir.path());
        let device = Default::default();

        let result = adapter.adapt::<TestBackend>("resnet18", 5, true, true, &device);
        assert!(matches!(result, Err(Error::PretrainedWeights(_))));
    }

    #[test]
    fn test_pretrained_weights_are_loaded_before_head_swap() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = ModelAdapter::new(temp_dir.path());
        let device = Default::default();

        let reference = Architecture::SqueezeNet1_1.build::<TestBackend>(&device);
        let AdaptedModel::SqueezeNet(ref squeeze) = reference else {
            panic!("expected a SqueezeNet");
        };
        let expected = squeeze.stem.weight.val().into_data();
        reference
            .save_file(
                adapter.weights_path(Architecture::SqueezeNet1_1),
                &ModelRecorder::new(),
            )
            .unwrap();

        let model = adapter
            .adapt::<TestBackend>("squeezenet1_1", 2, true, false, &device)
            .unwrap();
        let AdaptedModel::SqueezeNet(squeeze) = model else {
            panic!("expected a SqueezeNet");
        };
        squeeze.stem.weight.val().into_data().assert_eq(&expected, true);
        assert_eq!(squeeze.final_conv.weight.dims(), [2, 512, 1, 1]);
    }
}
