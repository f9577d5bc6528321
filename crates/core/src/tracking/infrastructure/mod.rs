pub mod hsv_histogram_extractor;
