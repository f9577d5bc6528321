pub mod coco_labels;
pub mod execution_provider;
pub mod onnx_yolo_detector;
