use geo::{CoordNum, Rect};
use std::collections::HashSet;

use crate::components::{Coordinate, Lookup};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IntersectionError {
    #[error("There is no intersection between extents")]
    NoIntersection,
}

pub trait Intersection {
    type Output;
    fn intersection(&self, rhs: &Self) -> Self::Output;
}

/// Labels of `self` also found in `rhs`, in the order of `self`.
impl Intersection for Coordinate {
    type Output = Coordinate;
    fn intersection(&self, rhs: &Self) -> Coordinate {
        let rhs: HashSet<_> = rhs.labels().iter().collect();
        self.labels()
            .iter()
            .filter(|label| rhs.contains(label))
            .cloned()
            .collect()
    }
}

impl<T: CoordNum> Intersection for Rect<T> {
    type Output = Result<Rect<T>, IntersectionError>;
    fn intersection(&self, rhs: &Self) -> Self::Output {
        let lhs_max = self.max();
        let rhs_min = rhs.min();
        if (lhs_max.x < rhs_min.x) | (lhs_max.y < rhs_min.y) {
            return Err(IntersectionError::NoIntersection);
        }

        let lhs_min = self.min();
        let rhs_max = rhs.max();
        if (lhs_min.x > rhs_max.x) | (lhs_min.y > rhs_max.y) {
            return Err(IntersectionError::NoIntersection);
        }

        let pick = |x: T, y: T, larger: bool| if (x > y) == larger { x } else { y };
        let min = geo::coord! {
            x: pick(lhs_min.x, rhs_min.x, true),
            y: pick(lhs_min.y, rhs_min.y, true),
        };
        let max = geo::coord! {
            x: pick(lhs_max.x, rhs_max.x, false),
            y: pick(lhs_max.y, rhs_max.y, false),
        };

        Ok(Rect::new(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Label;
    use rstest::rstest;

    #[rstest]
    fn coordinate_intersection_keeps_left_order() {
        let lhs: Coordinate = [5, 3, 1, 4].into_iter().collect();
        let rhs: Coordinate = [1, 4, 5, 9].into_iter().collect();
        assert_eq!(
            lhs.intersection(&rhs).to_vec(),
            vec![Label::Int(5), Label::Int(1), Label::Int(4)]
        );
    }

    #[rstest]
    #[case(Rect::new((0.0, 0.0), (10.0, 10.0)), Ok(Rect::new((5.0, 5.0), (10.0, 8.0))))]
    #[case(Rect::new((16.0, 0.0), (20.0, 10.0)), Err(IntersectionError::NoIntersection))]
    fn extents(
        #[case] rhs: Rect<f64>,
        #[case] expected: Result<Rect<f64>, IntersectionError>,
    ) {
        let lhs = Rect::new((5.0, 5.0), (15.0, 8.0));
        assert_eq!(lhs.intersection(&rhs), expected);
    }
}
