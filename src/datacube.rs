use chrono::TimeDelta;
use geo::{coord, Rect};
use itertools::Itertools;
use log::{debug, info};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    sync::Arc,
};

use crate::{
    components::{Axis, Dataset, Label, Lookup, TimeSpan},
    errors::{CubeError, Result},
    indexes::Indexes,
    intersection::{Intersection, IntersectionError},
    lazy::ChunkPlan,
    reduction::{GroupBy, Reduction},
    selection::LabelSelector,
};

/// Called with the number of loaded measurements and the total.
pub type Progress = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// How acquisitions sharing a timestamp group are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GroupRule {
    #[default]
    None,
    /// One scene per local solar day, the first valid value per pixel wins.
    SolarDay,
}

/// Request for data of one product.
#[derive(Clone, Default)]
pub struct Query {
    pub product: String,
    /// Area in the product's coordinate reference system.
    pub extent: Option<Rect<f64>>,
    pub output_crs: Option<String>,
    /// Inclusive bounds, partial dates cover their whole period.
    pub time: Option<(String, String)>,
    /// All measurements when empty.
    pub measurements: Vec<String>,
    /// Pixel size as `(y, x)`, signs are ignored.
    pub resolution: Option<(f64, f64)>,
    pub group_by: GroupRule,
    /// Block sizes of lazily loaded results.
    pub chunks: Option<ChunkPlan>,
    progress: Option<Progress>,
}

impl Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("product", &self.product)
            .field("extent", &self.extent)
            .field("output_crs", &self.output_crs)
            .field("time", &self.time)
            .field("measurements", &self.measurements)
            .field("resolution", &self.resolution)
            .field("group_by", &self.group_by)
            .field("chunks", &self.chunks)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Query {
    pub fn new(product: &str) -> Self {
        Self {
            product: product.to_string(),
            ..Default::default()
        }
    }

    pub fn with_extent(mut self, x: (f64, f64), y: (f64, f64)) -> Self {
        self.extent = Some(Rect::new(coord! { x: x.0, y: y.0 }, coord! { x: x.1, y: y.1 }));
        self
    }

    pub fn with_output_crs(mut self, crs: &str) -> Self {
        self.output_crs = Some(crs.to_string());
        self
    }

    pub fn with_time(mut self, start: &str, end: &str) -> Self {
        self.time = Some((start.to_string(), end.to_string()));
        self
    }

    pub fn with_measurements(mut self, measurements: &[&str]) -> Self {
        self.measurements = measurements.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_resolution(mut self, y: f64, x: f64) -> Self {
        self.resolution = Some((y, x));
        self
    }

    pub fn with_group_by(mut self, rule: GroupRule) -> Self {
        self.group_by = rule;
        self
    }

    pub fn with_chunks(mut self, chunks: ChunkPlan) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn report(&self, done: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(done, total)
        }
    }

    /// Inclusive time bounds as labels.
    pub fn time_range(&self) -> Result<Option<(Label, Label)>> {
        let Some((start, end)) = &self.time else {
            return Ok(None);
        };
        let start = TimeSpan::parse(start)?.start;
        let end = TimeSpan::parse(end)?.end;
        if start > end {
            return Err(CubeError::InvalidQuery(format!(
                "time range starts after it ends ({start} > {end})"
            )));
        }
        Ok(Some((Label::Time(start), Label::Time(end))))
    }

    /// Checks what can be checked without a product.
    pub fn validate(&self) -> Result<()> {
        if self.product.trim().is_empty() {
            return Err(CubeError::InvalidQuery("no product given".into()));
        }
        if let Some((y, x)) = self.resolution {
            if !(y.abs() > 0.0 && x.abs() > 0.0) {
                return Err(CubeError::InvalidQuery(format!(
                    "resolution ({y}, {x}) must be non-zero"
                )));
            }
        }
        self.time_range().map(|_| ())
    }
}

/// Access to stored products.
pub trait Datacube: Send + Sync {
    fn list_products(&self) -> Vec<String>;

    fn list_measurements(&self, product: &str) -> Result<Vec<String>>;

    /// Data matching `query`, a zero length time axis when nothing matches.
    fn load(&self, query: &Query) -> Result<Dataset>;
}

/// Scenes of one product over `time`, `y` and `x`.
#[derive(Debug, Clone)]
pub struct Product {
    pub dataset: Dataset,
    pub crs: String,
    /// Longitude of the scene centre, places acquisitions on local solar days.
    pub longitude: f64,
}

impl Product {
    pub fn new(dataset: Dataset, crs: &str, longitude: f64) -> Self {
        Self {
            dataset,
            crs: crs.to_string(),
            longitude,
        }
    }
}

/// Data cube held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCube {
    products: BTreeMap<String, Product>,
}

impl MemoryCube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, name: &str, product: Product) -> Self {
        self.products.insert(name.to_string(), product);
        self
    }

    fn product(&self, name: &str) -> Result<&Product> {
        self.products
            .get(name)
            .ok_or_else(|| CubeError::ProductNotFound(name.to_string()))
    }
}

impl Datacube for MemoryCube {
    fn list_products(&self) -> Vec<String> {
        self.products.keys().cloned().collect()
    }

    fn list_measurements(&self, product: &str) -> Result<Vec<String>> {
        Ok(self
            .product(product)?
            .dataset
            .names()
            .map(String::from)
            .collect())
    }

    fn load(&self, query: &Query) -> Result<Dataset> {
        query.validate()?;
        let product = self.product(&query.product)?;
        if let Some(crs) = &query.output_crs {
            if *crs != product.crs {
                return Err(CubeError::InvalidQuery(format!(
                    "`{}` is stored in {}, reprojecting to {crs} is not supported",
                    query.product, product.crs
                )));
            }
        }

        let names = if query.measurements.is_empty() {
            product.dataset.names().map(String::from).collect_vec()
        } else {
            query.measurements.clone()
        };
        for name in &names {
            product.dataset.variable(name)?;
        }
        let mut loaded: Option<Dataset> = None;
        for (done, name) in names.iter().enumerate() {
            let part = load_measurement(product, query, name)?;
            match &mut loaded {
                Some(dataset) => dataset.insert_array(part.get(name)?)?,
                None => loaded = Some(part),
            }
            query.report(done + 1, names.len());
        }
        let dataset = loaded.unwrap_or_default();
        info!(
            "Loaded {} scenes of `{}` with {} measurements",
            dataset.axis("time").map_or(0, |time| time.len()),
            query.product,
            dataset.len()
        );
        Ok(dataset.with_attr("crs", product.crs.as_str()))
    }
}

/// One measurement of `product`, clipped, strided and fused as `query` asks.
fn load_measurement(product: &Product, query: &Query, name: &str) -> Result<Dataset> {
    let mut dataset = product.dataset.subset(&[name])?;
    if let Some(extent) = &query.extent {
        match covered(&dataset)?.map(|covered| covered.intersection(extent)) {
            Some(Ok(clip)) => {
                dataset = dataset.sel(&[
                    ("x", LabelSelector::range(clip.min().x, clip.max().x)),
                    ("y", LabelSelector::range(clip.min().y, clip.max().y)),
                ])?
            }
            None | Some(Err(IntersectionError::NoIntersection)) => {
                debug!("`{}` does not cover {extent:?}", query.product);
                return empty(&dataset);
            }
        }
    }
    if let Some((start, end)) = query.time_range()? {
        dataset = dataset.sel(&[("time", LabelSelector::Range(start, end))])?;
    }
    if let Some((y, x)) = query.resolution {
        dataset = coarsen(&dataset, "y", y.abs())?;
        dataset = coarsen(&dataset, "x", x.abs())?;
    }
    if query.group_by == GroupRule::SolarDay {
        dataset = solar_day(&dataset, product.longitude)?;
    }
    Ok(dataset)
}

/// Lowest and highest numeric label of `axis`.
fn bounds(axis: &Axis) -> Result<Option<(f64, f64)>> {
    let values = axis
        .labels()
        .iter()
        .map(|label| {
            label
                .as_f64()
                .ok_or_else(|| CubeError::NotNumeric(axis.name.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(values
        .into_iter()
        .minmax_by(|lhs, rhs| lhs.total_cmp(rhs))
        .into_option())
}

/// Extent spanned by the pixel coordinates, `None` without pixels.
fn covered(dataset: &Dataset) -> Result<Option<Rect<f64>>> {
    let x = bounds(dataset.axis("x")?)?;
    let y = bounds(dataset.axis("y")?)?;
    Ok(x.zip(y).map(|((x_min, x_max), (y_min, y_max))| {
        Rect::new(coord! { x: x_min, y: y_min }, coord! { x: x_max, y: y_max })
    }))
}

fn empty(dataset: &Dataset) -> Result<Dataset> {
    let selectors = dataset
        .axes()
        .names()
        .map(|axis| (axis, Indexes::from(Vec::new())))
        .collect_vec();
    dataset.isel(&selectors)
}

/// Keeps every n-th pixel of `axis` so its spacing becomes `resolution`.
fn coarsen(dataset: &Dataset, axis: &str, resolution: f64) -> Result<Dataset> {
    let source = dataset.axis(axis)?;
    let [first, second, ..] = source.labels() else {
        return Ok(dataset.clone());
    };
    let (Some(first), Some(second)) = (first.as_f64(), second.as_f64()) else {
        return Err(CubeError::NotNumeric(axis.to_string()));
    };
    let native = (second - first).abs();
    let ratio = resolution / native;
    let stride = ratio.round();
    if stride < 1.0 || (ratio - stride).abs() > 1e-9 {
        return Err(CubeError::InvalidQuery(format!(
            "resolution {resolution} on `{axis}` is not a multiple of {native}"
        )));
    }
    if stride == 1.0 {
        return Ok(dataset.clone());
    }
    let positions = (0..source.len()).step_by(stride as usize).collect_vec();
    dataset.isel(&[(axis, Indexes::from(positions))])
}

/// Fuses acquisitions on the same local solar day into the first of them.
fn solar_day(dataset: &Dataset, longitude: f64) -> Result<Dataset> {
    let offset = TimeDelta::seconds((longitude / 15.0 * 3600.0).round() as i64);
    let time = dataset.axis("time")?;
    let mut groups: Vec<(Label, Vec<usize>)> = Vec::new();
    let mut slots = HashMap::new();
    for (position, label) in time.labels().iter().enumerate() {
        let acquired = label
            .as_time()
            .ok_or_else(|| CubeError::NotTemporal(time.name.to_string()))?;
        let day = acquired
            .checked_add_signed(offset)
            .ok_or_else(|| CubeError::InvalidDatetime(label.to_string()))?
            .date();
        let slot = *slots.entry(day).or_insert_with(|| {
            groups.push((label.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(position);
    }
    debug!(
        "Fused {} acquisitions into {} solar days",
        time.len(),
        groups.len()
    );
    GroupBy::new(dataset.clone(), "time", "time", groups).reduce(Reduction::First)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{Coordinate, MISSING},
        testing::{cube, ramp},
    };
    use rstest::rstest;
    use std::sync::Mutex;

    #[rstest]
    fn catalogue_lists_products_and_measurements() {
        let cube = cube();
        assert_eq!(cube.list_products(), ["s2_l2a"]);
        assert_eq!(
            cube.list_measurements("s2_l2a").unwrap(),
            ["blue", "green", "red", "nir"]
        );
        assert!(matches!(
            cube.list_measurements("ls9"),
            Err(CubeError::ProductNotFound(_))
        ));
    }

    #[rstest]
    fn time_bounds_are_inclusive() {
        let query = Query::new("s2_l2a").with_time("2020-12-01", "2020-12-25");
        let ds = cube().load(&query).unwrap();
        assert_eq!(
            ds.coord("time").unwrap().to_vec(),
            Coordinate::times(["2020-12-01", "2020-12-10", "2020-12-25"])
                .unwrap()
                .to_vec()
        );
        assert_eq!(ds.attrs()["crs"].to_string(), "EPSG:32632");
    }

    #[rstest]
    fn extent_clips_pixels() {
        let query = Query::new("s2_l2a")
            .with_extent((5.0, 25.0), (80.0, 100.0))
            .with_measurements(&["red", "nir"]);
        let ds = cube().load(&query).unwrap();
        assert_eq!(ds.names().collect_vec(), ["red", "nir"]);
        assert_eq!(ds.sizes(), vec![("time", 6), ("y", 2), ("x", 2)]);
        assert_eq!(ds.coord("x").unwrap().to_vec(), [Label::Float(10.0), Label::Float(20.0)]);
    }

    #[rstest]
    #[case(Query::new("s2_l2a").with_extent((500.0, 600.0), (0.0, 10.0)))]
    #[case(Query::new("s2_l2a").with_time("2019-01", "2019-06"))]
    fn nothing_matching_is_empty(#[case] query: Query) {
        let ds = cube().load(&query).unwrap();
        assert_eq!(ds.axis("time").unwrap().len(), 0);
        assert_eq!(ds.get("red").unwrap().values().len(), 0);
    }

    #[rstest]
    #[case(Query::new(""))]
    #[case(Query::new("s2_l2a").with_time("2021", "2020-06"))]
    #[case(Query::new("s2_l2a").with_resolution(0.0, 10.0))]
    #[case(Query::new("s2_l2a").with_resolution(-15.0, 15.0))]
    #[case(Query::new("s2_l2a").with_output_crs("EPSG:4326"))]
    fn invalid_queries(#[case] query: Query) {
        assert!(matches!(cube().load(&query), Err(CubeError::InvalidQuery(_))));
    }

    #[rstest]
    fn unknown_names_fail() {
        assert!(matches!(
            cube().load(&Query::new("ls9")),
            Err(CubeError::ProductNotFound(_))
        ));
        assert!(matches!(
            cube().load(&Query::new("s2_l2a").with_measurements(&["swir_1"])),
            Err(CubeError::VariableNotFound(_))
        ));
    }

    #[rstest]
    fn coarser_resolution_strides_pixels() {
        let query = Query::new("s2_l2a")
            .with_output_crs("EPSG:32632")
            .with_resolution(-20.0, 20.0);
        let ds = cube().load(&query).unwrap();
        assert_eq!(ds.sizes(), vec![("time", 6), ("y", 1), ("x", 2)]);
        assert_eq!(ds.coord("x").unwrap().to_vec(), [Label::Float(0.0), Label::Float(20.0)]);
    }

    #[rstest]
    fn progress_is_reported_per_measurement() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let query = Query::new("s2_l2a")
            .with_measurements(&["red", "green"])
            .with_progress(move |done, total| seen.lock().unwrap().push((done, total)));
        cube().load(&query).unwrap();
        assert_eq!(*calls.lock().unwrap(), [(1, 2), (2, 2)]);
    }

    #[rstest]
    fn failed_loads_report_no_progress() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let query = Query::new("s2_l2a")
            .with_measurements(&["red", "green"])
            .with_resolution(15.0, 15.0)
            .with_progress(move |done, total| seen.lock().unwrap().push((done, total)));
        assert!(matches!(cube().load(&query), Err(CubeError::InvalidQuery(_))));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[rstest]
    fn extent_clips_integer_pixel_labels() {
        let dataset = Dataset::builder()
            .axis("time", Coordinate::times(["2020-12-01"]).unwrap())
            .axis("y", Coordinate::range(2))
            .axis("x", Coordinate::range(3))
            .variable("red", &["time", "y", "x"], ramp(&[1, 2, 3]))
            .build()
            .unwrap();
        let cube = MemoryCube::new().with_product("grid", Product::new(dataset, "EPSG:32632", 0.0));
        let query = Query::new("grid").with_extent((0.5, 2.0), (0.0, 1.0));
        let ds = cube.load(&query).unwrap();
        assert_eq!(ds.sizes(), vec![("time", 1), ("y", 2), ("x", 2)]);
        assert_eq!(ds.coord("x").unwrap().to_vec(), [Label::Int(1), Label::Int(2)]);
    }

    #[rstest]
    #[case(9.0, 2)]
    #[case(0.0, 3)]
    fn solar_days_fuse_duplicates(#[case] longitude: f64, #[case] scenes: usize) {
        let time = Coordinate::times([
            "2020-12-01T23:50:00",
            "2020-12-02T00:10:00",
            "2020-12-04T10:30:00",
        ])
        .unwrap();
        let mut values = ramp(&[3, 1, 2]);
        values[&[0, 0, 1][..]] = MISSING;
        let dataset = Dataset::builder()
            .axis("time", time)
            .axis("y", Coordinate::from_iter([50.0]))
            .axis("x", Coordinate::from_iter([0.0, 10.0]))
            .variable("red", &["time", "y", "x"], values)
            .build()
            .unwrap();
        let cube =
            MemoryCube::new().with_product("s2", Product::new(dataset, "EPSG:32632", longitude));
        let query = Query::new("s2").with_group_by(GroupRule::SolarDay);
        let red = cube.load(&query).unwrap().get("red").unwrap();
        assert_eq!(red.shape()[0], scenes);
        if scenes == 2 {
            assert_eq!(
                red.axis("time").unwrap().labels()[0],
                Label::time("2020-12-01T23:50:00").unwrap()
            );
            // the first scene's gap is filled by the second
            assert_eq!(red.at(&[0, 0, 0]).unwrap(), 0.0);
            assert_eq!(red.at(&[0, 0, 1]).unwrap(), 3.0);
        }
    }
}
