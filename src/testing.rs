use ndarray::{ArrayD, IxDyn};

use crate::{
    components::{Coordinate, Dataset},
    datacube::{MemoryCube, Product},
};

/// `0, 1, 2, ...` laid out in standard order.
pub fn ramp(shape: &[usize]) -> ArrayD<f64> {
    let len = shape.iter().product::<usize>();
    ArrayD::from_shape_vec(IxDyn(shape), (0..len).map(|value| value as f64).collect())
        .expect("ramp length matches its shape")
}

/// Six scenes over a 2x3 tile, straddling the 2020/2021 new year.
pub fn scenes() -> Dataset {
    let time = Coordinate::times([
        "2020-11-28",
        "2020-12-01",
        "2020-12-10",
        "2020-12-25",
        "2021-01-05",
        "2021-01-20",
    ])
    .expect("fixture dates are valid");
    let shape = [6, 2, 3];
    Dataset::builder()
        .axis("time", time)
        .axis("y", Coordinate::from_iter([100.0, 90.0]))
        .axis("x", Coordinate::from_iter([0.0, 10.0, 20.0]))
        .variable("blue", &["time", "y", "x"], ramp(&shape) + 100.0)
        .variable("green", &["time", "y", "x"], ramp(&shape) + 200.0)
        .variable("red", &["time", "y", "x"], ramp(&shape) * 5.0 + 600.0)
        .variable("nir", &["time", "y", "x"], ramp(&shape) * 10.0 + 2000.0)
        .build()
        .expect("fixture is consistent")
}

/// Data cube serving [scenes] as `s2_l2a`.
pub fn cube() -> MemoryCube {
    MemoryCube::new().with_product("s2_l2a", Product::new(scenes(), "EPSG:32632", 9.0))
}
