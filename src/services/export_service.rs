use rust_xlsxwriter::*;

use crate::error::Result;
use crate::models::attempt::AttemptStatus;
use crate::models::test::TestDefinition;
use crate::services::result_service::ResultExportRow;
use rust_decimal::prelude::ToPrimitive;

pub struct ExportService;

impl ExportService {
    /// Generate a styled XLSX workbook with every attempt on a test,
    /// one row per student in leaderboard order.
    pub fn generate_results_xlsx(
        test: &TestDefinition,
        rows: &[ResultExportRow],
    ) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Results")?;

        // ── Color palette ──
        let primary_color = Color::RGB(0x1E293B);      // Slate 800
        let header_bg = Color::RGB(0x0F172A);          // Slate 900
        let header_text = Color::White;
        let alt_row_1 = Color::RGB(0xF8FAFC);          // Slate 50
        let alt_row_2 = Color::White;
        let border_color = Color::RGB(0xE2E8F0);       // Slate 200

        // Status colors
        let status_in_progress = Color::RGB(0x3B82F6); // Blue
        let status_completed = Color::RGB(0x10B981);   // Emerald
        let status_expired = Color::RGB(0xEF4444);     // Red

        // Score band colors
        let score_high = Color::RGB(0x10B981);         // Emerald (70+)
        let score_mid = Color::RGB(0xF59E0B);          // Amber (40-69)
        let score_low = Color::RGB(0xEF4444);          // Red (<40)

        // ── Column definitions ──
        let columns = [
            ("Rank",           8.0),
            ("Student",        30.0),
            ("Roll No",        16.0),
            ("Class",          14.0),
            ("Status",         16.0),
            ("Started",        22.0),
            ("Finished",       22.0),
            ("Marks",          12.0),
            ("Percentage",     14.0),
            ("Late",           10.0),
            ("Violations",     12.0),
        ];

        // Set column widths
        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }

        // ── Title row ──
        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(header_text)
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);

        worksheet.set_row_height(0, 40)?;
        let title = format!("Results: {}", test.title);
        worksheet.merge_range(0, 0, 0, (columns.len() - 1) as u16, &title, &title_format)?;

        // ── Subtitle row ──
        let subtitle_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);

        worksheet.set_row_height(1, 22)?;
        let now = chrono::Utc::now().format("%d.%m.%Y %H:%M UTC").to_string();
        let subtitle_text = format!(
            "Exported: {}  |  Class: {}  |  Total marks: {}  |  Attempts: {}",
            now,
            test.class_name,
            test.total_marks,
            rows.len()
        );
        worksheet.merge_range(1, 0, 1, (columns.len() - 1) as u16, &subtitle_text, &subtitle_format)?;

        // ── Header row ──
        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(header_text)
            .set_background_color(header_bg)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);

        let header_row = 2;
        worksheet.set_row_height(header_row, 30)?;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_string_with_format(header_row, i as u16, *name, &header_format)?;
        }

        // ── Data rows ──
        let data_start_row = 3;
        for (idx, entry) in rows.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let bg = if idx % 2 == 0 { alt_row_1 } else { alt_row_2 };

            let base_fmt = Format::new()
                .set_font_size(10)
                .set_background_color(bg)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);

            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);

            worksheet.set_row_height(row, 22)?;

            // Rank
            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;

            // Student
            let name_fmt = base_fmt.clone().set_bold();
            worksheet.write_string_with_format(row, 1, &entry.student_name, &name_fmt)?;

            // Roll no
            worksheet.write_string_with_format(row, 2, &entry.roll_no, &center_fmt)?;

            // Class
            worksheet.write_string_with_format(row, 3, &entry.class_name, &center_fmt)?;

            // Status (colored)
            let status_color = match entry.status {
                AttemptStatus::InProgress => status_in_progress,
                AttemptStatus::Completed => status_completed,
                AttemptStatus::Expired => status_expired,
            };
            let status_fmt = center_fmt
                .clone()
                .set_bold()
                .set_font_color(status_color);
            worksheet.write_string_with_format(row, 4, entry.status.as_str(), &status_fmt)?;

            // Started / finished
            let started = entry.started_at.format("%d.%m.%Y %H:%M:%S").to_string();
            worksheet.write_string_with_format(row, 5, &started, &center_fmt)?;
            let finished = entry
                .completed_at
                .map(|t| t.format("%d.%m.%Y %H:%M:%S").to_string())
                .unwrap_or_default();
            worksheet.write_string_with_format(row, 6, &finished, &center_fmt)?;

            // Marks
            let marks = entry.marks_obtained.unwrap_or(0);
            worksheet.write_number_with_format(row, 7, marks as f64, &center_fmt)?;

            // Percentage (colored by band)
            let pct = entry
                .percentage
                .as_ref()
                .and_then(|p| p.to_f64())
                .unwrap_or(0.0);
            let pct_color = if pct >= 70.0 {
                score_high
            } else if pct >= 40.0 {
                score_mid
            } else {
                score_low
            };
            let pct_fmt = center_fmt
                .clone()
                .set_bold()
                .set_font_color(pct_color)
                .set_num_format("0.00");
            worksheet.write_number_with_format(row, 8, pct, &pct_fmt)?;

            // Late flag
            let late = if entry.submitted_late { "yes" } else { "" };
            worksheet.write_string_with_format(row, 9, late, &center_fmt)?;

            // Proctoring violations
            worksheet.write_number_with_format(row, 10, entry.proctor_events as f64, &center_fmt)?;
        }

        // Freeze title, subtitle and headers
        worksheet.set_freeze_panes(data_start_row, 0)?;

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }
}
