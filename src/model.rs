use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    prelude::*,
};

/// Number of output classes, one per decimal digit.
pub const NUM_CLASSES: usize = 10;

/// Architecture descriptor of the digit classifier.
///
/// This is the structural half of a trained model: it says how to build the
/// layers, not what their values are. It is stored next to the weights as JSON.
#[derive(Config, Debug)]
pub struct DigitClassifierConfig {
    /// Height of the input images the network was trained on.
    #[config(default = 28)]
    pub input_height: usize,
    /// Width of the input images the network was trained on.
    #[config(default = 28)]
    pub input_width: usize,
    /// Output channels of the two convolutions.
    #[config(default = "[8, 16]")]
    pub conv_channels: [usize; 2],
    /// Square kernel size shared by both convolutions.
    #[config(default = 3)]
    pub kernel_size: usize,
    /// Spatial size after adaptive pooling.
    #[config(default = 8)]
    pub pooled_size: usize,
    #[config(default = 512)]
    pub hidden_size: usize,
}

impl DigitClassifierConfig {
    /// Checks that the descriptor can build a network able to consume its own input size.
    pub fn validate(&self) -> Result<(), String> {
        let sizes = [
            ("input_height", self.input_height),
            ("input_width", self.input_width),
            ("conv_channels[0]", self.conv_channels[0]),
            ("conv_channels[1]", self.conv_channels[1]),
            ("kernel_size", self.kernel_size),
            ("pooled_size", self.pooled_size),
            ("hidden_size", self.hidden_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(format!("{name} must be greater than zero"));
        }

        let reach = self.min_input_size();
        if self.input_height < reach || self.input_width < reach {
            return Err(format!(
                "input {}x{} is smaller than the {reach}x{reach} reach of the convolutions",
                self.input_height, self.input_width
            ));
        }

        Ok(())
    }

    /// Smallest spatial size two unpadded convolutions can consume.
    pub fn min_input_size(&self) -> usize {
        2 * self.kernel_size.saturating_sub(1) + 1
    }

    /// Input shape `[height, width]` expected by the network.
    pub fn input_shape(&self) -> [usize; 2] {
        [self.input_height, self.input_width]
    }

    fn flattened_size(&self) -> usize {
        self.conv_channels[1] * self.pooled_size * self.pooled_size
    }

    /// Returns the shape of every learnable tensor this descriptor defines.
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        let [c1, c2] = self.conv_channels;
        let k = self.kernel_size;

        vec![
            ("conv1.weight", vec![c1, 1, k, k]),
            ("conv1.bias", vec![c1]),
            ("conv2.weight", vec![c2, c1, k, k]),
            ("conv2.bias", vec![c2]),
            ("linear1.weight", vec![self.flattened_size(), self.hidden_size]),
            ("linear1.bias", vec![self.hidden_size]),
            ("linear2.weight", vec![self.hidden_size, NUM_CLASSES]),
            ("linear2.bias", vec![NUM_CLASSES]),
        ]
    }

    /// Initializes a model with random parameters.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DigitClassifier<B> {
        let [c1, c2] = self.conv_channels;
        let kernel = [self.kernel_size, self.kernel_size];

        DigitClassifier {
            conv1: Conv2dConfig::new([1, c1], kernel).init(device),
            conv2: Conv2dConfig::new([c1, c2], kernel).init(device),
            pool: AdaptiveAvgPool2dConfig::new([self.pooled_size, self.pooled_size]).init(),
            linear1: LinearConfig::new(self.flattened_size(), self.hidden_size).init(device),
            linear2: LinearConfig::new(self.hidden_size, NUM_CLASSES).init(device),
            activation: Relu::new(),
            input_height: self.input_height,
            input_width: self.input_width,
        }
    }

    /// Initializes a model and applies the trained parameters in `record`.
    pub fn init_with<B: Backend>(
        &self,
        record: DigitClassifierRecord<B>,
        device: &B::Device,
    ) -> DigitClassifier<B> {
        self.init(device).load_record(record)
    }
}

/// Convolutional digit classifier.
///
/// Carries no train-time layers; it only ever runs forward passes.
#[derive(Module, Debug)]
pub struct DigitClassifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    linear1: Linear<B>,
    linear2: Linear<B>,
    activation: Relu,
    input_height: usize,
    input_width: usize,
}

impl<B: Backend> DigitClassifier<B> {
    /// # Shapes
    ///   - Images `[batch_size, 1, height, width]`
    ///   - Output `[batch_size, NUM_CLASSES]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _channels, _height, _width] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        let [_, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.linear1.forward(x);
        let x = self.activation.forward(x);
        self.linear2.forward(x)
    }

    /// Input shape `[height, width]` the classifier was built for.
    pub fn input_shape(&self) -> [usize; 2] {
        [self.input_height, self.input_width]
    }

    /// Returns the shape of every learnable tensor actually held by the module.
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        self.clone().into_record().parameter_shapes()
    }

    /// Device holding the parameters.
    pub fn device(&self) -> B::Device {
        self.linear2.weight.device()
    }
}

impl<B: Backend> DigitClassifierRecord<B> {
    /// Returns the shape of every learnable tensor stored in the record.
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        fn bias<B: Backend>(bias: &Option<Param<Tensor<B, 1>>>) -> Vec<usize> {
            bias.as_ref()
                .map(|bias| bias.dims().to_vec())
                .unwrap_or_default()
        }

        vec![
            ("conv1.weight", self.conv1.weight.dims().to_vec()),
            ("conv1.bias", bias(&self.conv1.bias)),
            ("conv2.weight", self.conv2.weight.dims().to_vec()),
            ("conv2.bias", bias(&self.conv2.bias)),
            ("linear1.weight", self.linear1.weight.dims().to_vec()),
            ("linear1.bias", bias(&self.linear1.bias)),
            ("linear2.weight", self.linear2.weight.dims().to_vec()),
            ("linear2.bias", bias(&self.linear2.bias)),
        ]
    }
}
