//! SVG assembly: coordinate formatting, path data rendering, and the
//! `<path>` / `<symbol>` / `<svg>` wrappers.

use crate::vectorize::{Curve, SegTag};

/// Format a coordinate to at most three decimals, eliding a trailing
/// `.000`.
pub fn fixed(n: f64) -> String {
    let s = format!("{:.3}", n);
    match s.strip_suffix(".000") {
        Some(trimmed) => trimmed.to_string(),
        None => s,
    }
}

/// Render one curve as SVG path data.
///
/// Starts at the closing segment's endpoint, then emits `C` for every CURVE
/// segment and a two-point `L` for every CORNER, closing with `Z`.
pub fn render_path_data(curve: &Curve, scale: (f64, f64)) -> String {
    let (sx, sy) = scale;
    let n = curve.n;
    if n == 0 {
        return String::new();
    }

    let start = curve.c[(n - 1) * 3 + 2];
    let mut parts = Vec::with_capacity(n + 2);
    parts.push(format!("M {} {}", fixed(start.x * sx), fixed(start.y * sy)));

    for i in 0..n {
        let c0 = curve.c[i * 3];
        let c1 = curve.c[i * 3 + 1];
        let c2 = curve.c[i * 3 + 2];
        match curve.tag[i] {
            SegTag::Curve => parts.push(format!(
                "C {} {}, {} {}, {} {}",
                fixed(c0.x * sx),
                fixed(c0.y * sy),
                fixed(c1.x * sx),
                fixed(c1.y * sy),
                fixed(c2.x * sx),
                fixed(c2.y * sy),
            )),
            SegTag::Corner => parts.push(format!(
                "L {} {} {} {}",
                fixed(c1.x * sx),
                fixed(c1.y * sy),
                fixed(c2.x * sx),
                fixed(c2.y * sy),
            )),
        }
    }

    parts.push("Z".to_string());
    parts.join(" ")
}

/// The `<path>` element. An empty `d` is emitted as-is so callers can
/// produce a valid document for a blank image.
pub fn path_tag(d: &str, fill: &str, opacity: Option<f64>) -> String {
    match opacity {
        Some(op) => format!(
            "<path d=\"{}\" stroke=\"none\" fill=\"{}\" fill-rule=\"evenodd\" fill-opacity=\"{:.3}\"/>",
            d, fill, op
        ),
        None => format!(
            "<path d=\"{}\" stroke=\"none\" fill=\"{}\" fill-rule=\"evenodd\"/>",
            d, fill
        ),
    }
}

/// The `<symbol>` wrapper: always carries a viewBox, never a fill, so a
/// `<use>` site controls the color.
pub fn symbol(body: &str, id: &str, width: u32, height: u32) -> String {
    format!(
        "<symbol viewBox=\"0 0 {} {}\" id=\"{}\">{}</symbol>",
        width, height, id, body
    )
}

/// A complete SVG document around the given elements. Empty elements are
/// skipped; a non-transparent background becomes a full-size `<rect>`.
pub fn svg_document(width: u32, height: u32, background: Option<&str>, elements: &[String]) -> String {
    let mut lines = Vec::with_capacity(elements.len() + 3);
    lines.push(format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\" version=\"1.1\">",
        width, height, width, height
    ));
    if let Some(bg) = background {
        lines.push(format!(
            "\t<rect x=\"0\" y=\"0\" width=\"100%\" height=\"100%\" fill=\"{}\" />",
            bg
        ));
    }
    for el in elements {
        if !el.is_empty() {
            lines.push(format!("\t{}", el));
        }
    }
    lines.push("</svg>".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorize::curve::smooth;
    use kurbo::Point;

    #[test]
    fn fixed_elides_whole_numbers() {
        assert_eq!(fixed(5.0), "5");
        assert_eq!(fixed(5.25), "5.250");
        assert_eq!(fixed(5.2504), "5.250");
        assert_eq!(fixed(5.0004), "5");
        assert_eq!(fixed(-3.0), "-3");
        assert_eq!(fixed(0.125), "0.125");
    }

    #[test]
    fn corner_square_renders_four_line_commands() {
        let vertices = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 12.0),
            Point::new(12.0, 12.0),
            Point::new(12.0, 0.0),
        ];
        let curve = smooth(&vertices, 1.0);
        let d = render_path_data(&curve, (1.0, 1.0));
        assert!(d.starts_with("M "));
        assert!(d.ends_with(" Z"));
        assert_eq!(d.matches('L').count(), 4);
        assert_eq!(d.matches('C').count(), 0);
    }

    #[test]
    fn scale_is_applied_per_axis() {
        let vertices = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
        ];
        let curve = smooth(&vertices, 1.0);
        let d = render_path_data(&curve, (2.0, 0.5));
        assert!(d.contains("20"), "x values should double: {}", d);
        assert!(!d.contains("10 10"), "unscaled pair survived: {}", d);
    }

    #[test]
    fn path_tag_shapes() {
        assert_eq!(
            path_tag("", "black", None),
            "<path d=\"\" stroke=\"none\" fill=\"black\" fill-rule=\"evenodd\"/>"
        );
        let with_opacity = path_tag("M 0 0 Z", "black", Some(0.5));
        assert!(with_opacity.contains("fill-opacity=\"0.500\""));
    }

    #[test]
    fn document_skips_empty_elements() {
        let doc = svg_document(10, 20, Some("white"), &[String::new(), "<path d=\"\"/>".into()]);
        assert!(doc.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"20\""));
        assert!(doc.contains("viewBox=\"0 0 10 20\""));
        assert!(doc.contains("<rect"));
        assert_eq!(doc.matches("<path").count(), 1);
        assert!(doc.ends_with("</svg>"));
    }
}
