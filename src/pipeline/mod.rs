pub mod extraction;
pub mod classifier; // Token classification backends (perceptron, ONNX)
pub mod processor; // Document processing orchestrator
