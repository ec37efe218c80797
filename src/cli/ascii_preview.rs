use crate::core::detector::FaceBox;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent},
    terminal::{self, ClearType},
};
use image::DynamicImage;
use std::io::{self, Write};

const ASCII_RAMP: &[char] = &[' ', '.', '·', ':', ';', '+', '=', 'x', 'X', '#', '@'];
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;
const MAX_BAR_CELLS: usize = 20;

/// Renders camera frames as text so enrollment works over SSH.
pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps redraws cheap
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(1),
            height: height.unwrap_or((term_height.saturating_sub(5) / 2).min(DEFAULT_HEIGHT / 2)).max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn render_frame_with_progress(
        &self,
        image: &DynamicImage,
        faces: &[FaceBox],
        saved: usize,
        target: usize,
    ) -> String {
        let mut grid = self.image_to_ascii(image);
        let (img_width, img_height) = (image.width() as f32, image.height() as f32);

        for face in faces {
            self.draw_face_box(&mut grid, face, img_width, img_height);
        }

        if let Some(face) = faces.first() {
            let face_x1 = ((face.x1 / img_width) * self.width as f32) as usize;
            let face_x2 = ((face.x2 / img_width) * self.width as f32) as usize;
            let face_y1 = ((face.y1 / img_height) * self.height as f32) as usize;
            let center_x = (face_x1 + face_x2) / 2;

            let msg = if saved < target { "Move head slightly" } else { "Complete!" };
            self.overlay_text(&mut grid, msg, center_x, face_y1.saturating_sub(2));
        }

        let mut text = self.grid_to_string(&grid);
        text.push_str("\r\n");
        text.push_str(&progress_bar(saved, target));
        text.push_str("  Esc to cancel");
        text
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ASCII_RAMP[brightness * (ASCII_RAMP.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        let start_x = center_x.saturating_sub(text.chars().count() / 2);
        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, img_width: f32, img_height: f32) {
        let scale = |v: f32, extent: f32, cells: usize| -> usize {
            (((v / extent) * cells as f32).max(0.0) as usize).min(cells.saturating_sub(1))
        };
        let x1 = scale(face.x1, img_width, self.width);
        let x2 = scale(face.x2, img_width, self.width);
        let y1 = scale(face.y1, img_height, self.height);
        let y2 = scale(face.y2, img_height, self.height);
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in (x1 + 1)..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }
        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

/// `[■■□□□] 2/5`, scaled down for large targets.
pub fn progress_bar(saved: usize, target: usize) -> String {
    let cells = target.clamp(1, MAX_BAR_CELLS);
    let filled = if target == 0 { cells } else { (saved.min(target) * cells) / target };
    format!(
        "[{}{}] {}/{}",
        "■".repeat(filled),
        "□".repeat(cells - filled),
        saved,
        target
    )
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

pub fn check_for_escape() -> io::Result<bool> {
    if event::poll(std::time::Duration::from_millis(0))? {
        if let Event::Key(KeyEvent { code, .. }) = event::read()? {
            return Ok(code == KeyCode::Esc);
        }
    }
    Ok(false)
}
