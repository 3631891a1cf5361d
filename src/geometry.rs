use geo::{BooleanOps, Coord, CoordsIter, LineString, MultiPolygon, Polygon};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Polygon,
    MultiPolygon,
}

impl GeometryType {
    pub fn ogc_code(self) -> i64 {
        match self {
            GeometryType::Polygon => 3,
            GeometryType::MultiPolygon => 6,
        }
    }
}

const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOLYGON: u32 = 6;

/// Little-endian WKB. A single polygon is written as `Polygon`, anything else
/// as `MultiPolygon`; an empty geometry is an empty polygon.
pub fn to_wkb(geom: &MultiPolygon<f64>) -> Vec<u8> {
    let mut out = Vec::new();
    match geom.0.as_slice() {
        [] => {
            out.push(1);
            out.extend_from_slice(&WKB_POLYGON.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        [single] => write_polygon(&mut out, single),
        many => {
            out.push(1);
            out.extend_from_slice(&WKB_MULTIPOLYGON.to_le_bytes());
            out.extend_from_slice(&(many.len() as u32).to_le_bytes());
            for p in many {
                write_polygon(&mut out, p);
            }
        }
    }
    out
}

fn write_polygon(out: &mut Vec<u8>, p: &Polygon<f64>) {
    out.push(1);
    out.extend_from_slice(&WKB_POLYGON.to_le_bytes());
    let rings: Vec<&LineString<f64>> = std::iter::once(p.exterior())
        .chain(p.interiors().iter())
        .filter(|r| !r.0.is_empty())
        .collect();
    out.extend_from_slice(&(rings.len() as u32).to_le_bytes());
    for ring in rings {
        out.extend_from_slice(&(ring.0.len() as u32).to_le_bytes());
        for c in &ring.0 {
            out.extend_from_slice(&c.x.to_le_bytes());
            out.extend_from_slice(&c.y.to_le_bytes());
        }
    }
}

pub fn from_wkb(bytes: &[u8]) -> anyhow::Result<MultiPolygon<f64>> {
    let mut r = WkbCursor { bytes, pos: 0 };
    let (little, kind) = r.header()?;
    match kind {
        WKB_POLYGON => {
            let p = r.polygon(little)?;
            Ok(MultiPolygon(p.into_iter().collect()))
        }
        WKB_MULTIPOLYGON => {
            let n = r.u32(little)?;
            let mut polys = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let (little, kind) = r.header()?;
                anyhow::ensure!(kind == WKB_POLYGON, "unexpected WKB member type {kind}");
                if let Some(p) = r.polygon(little)? {
                    polys.push(p);
                }
            }
            Ok(MultiPolygon(polys))
        }
        other => anyhow::bail!("unsupported WKB geometry type {other}"),
    }
}

struct WkbCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl WkbCursor<'_> {
    fn take<const N: usize>(&mut self) -> anyhow::Result<[u8; N]> {
        let end = self.pos + N;
        anyhow::ensure!(end <= self.bytes.len(), "truncated WKB");
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(buf)
    }

    fn header(&mut self) -> anyhow::Result<(bool, u32)> {
        let [order] = self.take::<1>()?;
        let little = order == 1;
        Ok((little, self.u32(little)?))
    }

    fn u32(&mut self, little: bool) -> anyhow::Result<u32> {
        let b = self.take::<4>()?;
        Ok(if little { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) })
    }

    fn f64(&mut self, little: bool) -> anyhow::Result<f64> {
        let b = self.take::<8>()?;
        Ok(if little { f64::from_le_bytes(b) } else { f64::from_be_bytes(b) })
    }

    fn polygon(&mut self, little: bool) -> anyhow::Result<Option<Polygon<f64>>> {
        let n_rings = self.u32(little)?;
        let mut rings = Vec::with_capacity(n_rings as usize);
        for _ in 0..n_rings {
            let n_points = self.u32(little)?;
            let mut coords = Vec::with_capacity(n_points as usize);
            for _ in 0..n_points {
                let x = self.f64(little)?;
                let y = self.f64(little)?;
                coords.push(Coord { x, y });
            }
            rings.push(LineString(coords));
        }
        let mut rings = rings.into_iter();
        Ok(rings
            .next()
            .map(|exterior| Polygon::new(exterior, rings.collect())))
    }
}

/// Union of `acc` and `geom`, or `None` when the operation cannot be carried
/// out on the inputs.
pub fn try_union(acc: &MultiPolygon<f64>, geom: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if !is_finite(geom) {
        return None;
    }
    if acc.0.is_empty() {
        return Some(geom.clone());
    }
    if geom.0.is_empty() {
        return Some(acc.clone());
    }
    Some(acc.union(geom))
}

fn is_finite(geom: &MultiPolygon<f64>) -> bool {
    geom.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}
