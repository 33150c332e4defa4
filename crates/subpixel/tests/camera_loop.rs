//! Camera ticks drawn through a real adapter, fed by an image sequence.
//! Each test skips when the host has no usable GPU.

use std::path::Path;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use subpixel::{
    Blob, CameraOptions, Canvas, ExportOptions, GpuOptions, ImageSequenceDevices, InterlaceField,
    Orientation, SubpixelProcessor,
};
use tempfile::TempDir;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: [u8; 4] = [0, 0, 0, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

fn camera_processor(directory: &Path) -> Option<SubpixelProcessor> {
    let devices = ImageSequenceDevices::new(directory).with_interval(Duration::ZERO);
    let mut processor =
        SubpixelProcessor::new(GpuOptions::default()).with_media_devices(Box::new(devices));
    match processor.init() {
        Ok(()) => Some(processor),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn pump_tick(processor: &mut SubpixelProcessor) {
    for _ in 0..1000 {
        if processor.pump_camera().unwrap() {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("camera never ticked");
}

fn decode(blob: &Blob) -> RgbaImage {
    image::load_from_memory(&blob.bytes).unwrap().to_rgba8()
}

fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (*a as i16 - e as i16).abs() <= 2,
            "expected {expected:?}, got {actual:?}"
        );
    }
}

fn pump_and_record(processor: &mut SubpixelProcessor, canvas: &Canvas) -> (u32, u32) {
    pump_tick(processor);
    let frame = processor.camera_frame_dimensions().unwrap();
    let size = (canvas.width(), canvas.height());
    assert_eq!(size, (frame.width() * 3, frame.height() * 3));
    assert_eq!(
        canvas.aspect_ratio(),
        Some(frame.width() as f64 / frame.height() as f64)
    );
    size
}

#[test]
fn ticks_resize_alternate_fields_and_settle_exports() {
    let dir = TempDir::new().unwrap();
    RgbaImage::from_pixel(2, 2, WHITE)
        .save(dir.path().join("a.png"))
        .unwrap();
    RgbaImage::from_pixel(4, 2, WHITE)
        .save(dir.path().join("b.png"))
        .unwrap();
    let Some(mut processor) = camera_processor(dir.path()) else {
        return;
    };
    processor.set_orientation(Orientation::Rows);
    processor.set_interlaced(true);
    processor.set_field(InterlaceField::Odd);

    let canvas = Canvas::new();
    processor
        .start_camera(&canvas, &CameraOptions::default())
        .unwrap();

    let mut sizes = vec![pump_and_record(&mut processor, &canvas)];
    let first = processor.export_camera_frame(ExportOptions::default());
    assert_eq!(first.try_take(), None);

    // Second tick draws the even field and settles the first export.
    sizes.push(pump_and_record(&mut processor, &canvas));
    let blob = first.try_take().unwrap().expect("tick should capture the frame");
    let even = decode(&blob);
    assert_eq!(even.dimensions(), sizes[1]);
    assert_close(even.get_pixel(0, 0).0, BLACK);
    assert_close(even.get_pixel(0, 3).0, RED);

    let second = processor.export_camera_frame(ExportOptions::default());
    sizes.push(pump_and_record(&mut processor, &canvas));
    let odd = decode(&second.try_take().unwrap().expect("tick should capture the frame"));
    assert_eq!(odd.dimensions(), sizes[2]);
    assert_close(odd.get_pixel(0, 0).0, RED);
    assert_close(odd.get_pixel(0, 3).0, BLACK);

    sizes.push(pump_and_record(&mut processor, &canvas));
    assert!(sizes.windows(2).all(|pair| pair[0] != pair[1]));
    assert!(sizes.iter().all(|size| *size == (6, 6) || *size == (12, 6)));
    assert_eq!(processor.field(), InterlaceField::Odd);

    let last = processor.export_camera_frame(ExportOptions::default());
    processor.stop_camera();
    assert_eq!(last.wait(), None);
    assert!(!processor.is_camera_active());
}

#[test]
fn stills_after_camera_use_the_selected_field() {
    let dir = TempDir::new().unwrap();
    RgbaImage::from_pixel(1, 2, WHITE)
        .save(dir.path().join("frame.png"))
        .unwrap();
    let Some(mut processor) = camera_processor(dir.path()) else {
        return;
    };
    processor.set_orientation(Orientation::Rows);
    processor.set_interlaced(true);
    processor.set_field(InterlaceField::Odd);

    let canvas = Canvas::new();
    processor
        .start_camera(&canvas, &CameraOptions::default())
        .unwrap();
    // Two ticks leave the even field as the last one drawn.
    pump_tick(&mut processor);
    pump_tick(&mut processor);
    processor.stop_camera();
    assert_eq!(processor.field(), InterlaceField::Odd);

    let image = RgbaImage::from_pixel(1, 2, WHITE);
    let still = Canvas::new();
    processor.render_image(&still, &image).unwrap();
    let blob = processor
        .export_image(&image, ExportOptions::default())
        .unwrap()
        .expect("configured canvas should export");
    let rendered = decode(&blob);
    assert_eq!(rendered.dimensions(), (3, 6));
    assert_close(rendered.get_pixel(1, 0).0, RED);
    assert_close(rendered.get_pixel(1, 3).0, BLACK);
}
