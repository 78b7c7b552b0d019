//! Dark palette

use super::{BaseColors, MarkdownColors, Rgb, TextColors, ThemeColors};

/// Build the dark palette.
pub fn palette() -> ThemeColors {
    ThemeColors {
        base: BaseColors {
            background: Rgb::new(30, 30, 30),
            background_tertiary: Rgb::new(45, 45, 45),
            border: Rgb::new(60, 60, 60),
        },
        text: TextColors {
            primary: Rgb::new(220, 220, 220),
            muted: Rgb::new(140, 140, 140),
            link: Rgb::new(100, 180, 255),
            code: Rgb::new(200, 200, 150),
            error: Rgb::new(255, 100, 100),
        },
        markdown: MarkdownColors {
            heading: Rgb::new(100, 180, 255),
            blockquote_border: Rgb::new(80, 80, 80),
            blockquote_text: Rgb::new(180, 180, 180),
            code_block_bg: Rgb::new(35, 39, 46),
            code_block_border: Rgb::new(55, 60, 68),
            horizontal_rule: Rgb::new(80, 80, 80),
            table_border: Rgb::new(60, 65, 75),
            table_header_bg: Rgb::new(45, 50, 60),
        },
    }
}
