//! Wavefront OBJ export of the refined cloud.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use glam::Vec3;
use recon_data::Face;
use tracing::info;

/// Write vertices and 1-based faces as OBJ text.
pub fn write_obj<W: Write>(mut writer: W, vertices: &[Vec3], faces: &[Face]) -> std::io::Result<()> {
    writeln!(writer, "# recon OBJ export")?;
    writeln!(writer, "# Vertices: {}, Faces: {}", vertices.len(), faces.len())?;
    for v in vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for [a, b, c] in faces {
        writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    writer.flush()
}

pub fn save_obj(path: impl AsRef<Path>, vertices: &[Vec3], faces: &[Face]) -> std::io::Result<()> {
    let path = path.as_ref();
    write_obj(BufWriter::new(File::create(path)?), vertices, faces)?;
    info!("Wrote {} vertices and {} faces to {:?}", vertices.len(), faces.len(), path);
    Ok(())
}
