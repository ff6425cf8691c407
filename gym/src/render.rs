//! A tiny software rasterizer and a terminal viewer for it.
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use tch::Tensor;

use crate::error::Result;

pub type Rgb = [u8; 3];

pub const WHITE: Rgb = [255, 255, 255];
pub const BLACK: Rgb = [0, 0, 0];
pub const RED: Rgb = [255, 0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Draw into the terminal, at most `fps` frames per second.
    Human { fps: u32 },
    /// Return the frame as a `[3, height, width]` uint8 tensor.
    RgbArray,
}

/// An RGB image stored row major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 3],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        let i = (y * self.width + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = (y as usize * self.width + x as usize) * 3;
        self.pixels[i..i + 3].copy_from_slice(&color);
    }

    pub fn fill(&mut self, color: Rgb) {
        for px in self.pixels.chunks_exact_mut(3) {
            px.copy_from_slice(&color);
        }
    }

    /// Fills the rectangle with top-left corner `(x, y)`, clipped to the frame.
    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
        for py in y..y + h {
            for px in x..x + w {
                self.put(px, py, color);
            }
        }
    }

    /// Draws a segment `width` pixels thick.
    pub fn draw_line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Rgb) {
        let half = width / 2.0;
        let min_x = (from.0.min(to.0) - half).floor() as i64;
        let max_x = (from.0.max(to.0) + half).ceil() as i64;
        let min_y = (from.1.min(to.1) - half).floor() as i64;
        let max_y = (from.1.max(to.1) + half).ceil() as i64;
        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let d = distance_to_segment((px as f64, py as f64), from, to);
                if d <= half {
                    self.put(px, py, color);
                }
            }
        }
    }

    /// The frame as a `[3, height, width]` uint8 tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor::of_slice(&self.pixels)
            .view([self.height as i64, self.width as i64, 3])
            .permute(&[2, 0, 1])
    }

    /// Downsamples the frame to `cols` x `rows` characters.
    pub fn to_text(&self, cols: usize, rows: usize) -> String {
        let mut out = String::with_capacity((cols + 1) * rows);
        for row in 0..rows {
            let y = (row * self.height + self.height / 2) / rows;
            for col in 0..cols {
                let x = (col * self.width + self.width / 2) / cols;
                out.push(match self.pixel(x.min(self.width - 1), y.min(self.height - 1)) {
                    WHITE => ' ',
                    BLACK => '#',
                    RED => '*',
                    _ => '.',
                });
            }
            out.push('\n');
        }
        out
    }
}

fn distance_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Terminal display paced like a game clock.
#[derive(Debug)]
pub struct Viewer {
    cols: usize,
    rows: usize,
    last_frame: Option<Instant>,
}

impl Viewer {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            last_frame: None,
        }
    }

    pub fn show(&mut self, frame: &Frame, caption: &str, fps: u32) -> Result<()> {
        if let (Some(last), true) = (self.last_frame, fps > 0) {
            let budget = Duration::from_secs_f64(1.0 / fps as f64);
            let spent = last.elapsed();
            if spent < budget {
                thread::sleep(budget - spent);
            }
        }
        let text = frame.to_text(self.cols, self.rows);
        let mut stdout = io::stdout().lock();
        // clear screen and home the cursor
        write!(stdout, "\x1b[2J\x1b[H{}\n{}", caption, text)?;
        stdout.flush()?;
        self.last_frame = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_is_clipped() {
        let mut frame = Frame::new(10, 10);
        frame.fill(WHITE);
        frame.fill_rect(8, 8, 5, 5, BLACK);
        assert_eq!(frame.pixel(9, 9), BLACK);
        assert_eq!(frame.pixel(7, 7), WHITE);
    }

    #[test]
    fn thick_line_covers_its_axis() {
        let mut frame = Frame::new(20, 20);
        frame.fill(WHITE);
        frame.draw_line((10.0, 18.0), (10.0, 2.0), 6.0, RED);
        assert_eq!(frame.pixel(10, 10), RED);
        assert_eq!(frame.pixel(12, 10), RED);
        assert_eq!(frame.pixel(16, 10), WHITE);
    }

    #[test]
    fn tensor_is_channel_first() {
        let mut frame = Frame::new(4, 2);
        frame.fill(RED);
        let t = frame.to_tensor();
        assert_eq!(t.size(), vec![3, 2, 4]);
        assert_eq!(t.int64_value(&[0, 1, 3]), 255);
        assert_eq!(t.int64_value(&[1, 1, 3]), 0);
    }

    #[test]
    fn text_marks_colors() {
        let mut frame = Frame::new(4, 4);
        frame.fill(WHITE);
        frame.fill_rect(0, 0, 2, 4, BLACK);
        assert_eq!(frame.to_text(2, 1), "# \n");
    }
}
