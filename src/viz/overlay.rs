//! Cuboid overlay drawing on the processed color frame.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use nalgebra::Vector2;

use crate::config::ClassTable;
use crate::detector::CUBOID_VERTEX_COUNT;
use crate::pipeline::result::RefinedDetection;

/// Corner indexing: 0-3 front face, 4-7 rear face, matching the detector's
/// projected vertex order.
const CUBOID_EDGES: [(usize, usize); 12] = [
    // front face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    // rear face
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    // connecting edges
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Radius of the dot marking the first front-face corner.
const ANCHOR_RADIUS: i32 = 3;

/// Draw one projected cuboid.
pub fn draw_cuboid(
    image: &mut RgbImage,
    corners: &[Vector2<f64>; CUBOID_VERTEX_COUNT],
    color: [u8; 3],
) {
    let rgb = Rgb(color);
    for (a, b) in CUBOID_EDGES {
        draw_line_segment_mut(
            image,
            (corners[a].x as f32, corners[a].y as f32),
            (corners[b].x as f32, corners[b].y as f32),
            rgb,
        );
    }
    draw_filled_circle_mut(
        image,
        (corners[0].x as i32, corners[0].y as i32),
        ANCHOR_RADIUS,
        rgb,
    );
}

/// Draw all detections whose full cuboid was resolved; detections with a
/// missing corner keep their published pose but are not drawn.
pub fn draw_detections(image: &mut RgbImage, detections: &[RefinedDetection], classes: &ClassTable) {
    for detection in detections {
        let mut corners = [Vector2::zeros(); CUBOID_VERTEX_COUNT];
        let mut complete = true;
        for (slot, corner) in corners.iter_mut().zip(detection.cuboid_px.iter()) {
            match corner {
                Some(c) => *slot = *c,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }
        let color = classes
            .get(&detection.class_name)
            .map(|c| c.color)
            .unwrap_or([255, 255, 255]);
        draw_cuboid(image, &corners, color);
    }
}
