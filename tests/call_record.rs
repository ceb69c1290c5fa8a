use std::cell::RefCell;
use std::fmt;

use approx::assert_relative_eq;
use lagrange::{
    BinaryRecord, CallRecord, DynRowsMatrix, Erased, Error, ExecutionTrace, JacobianMap, Key,
    ReverseAd, RowKind, Rows, UnaryRecord, MAX_VIRTUAL_STATIC_ROWS,
};
use nalgebra::{DMatrix, Dyn, Matrix2x3, Matrix3, SMatrix};

/// Implements every slot by hand and remembers which one ran.
#[derive(Default)]
struct SlotSpy {
    calls: RefCell<Vec<String>>,
}

impl SlotSpy {
    fn hit(&self, slot: &str) -> Result<(), Error> {
        self.calls.borrow_mut().push(slot.to_string());
        Ok(())
    }
}

impl CallRecord<3> for SlotSpy {
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{indent}SlotSpy")
    }

    fn start_reverse_ad(&self, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit("start")
    }

    fn reverse_ad_1(&self, _: &SMatrix<f64, 1, 3>, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit("1")
    }

    fn reverse_ad_2(&self, _: &SMatrix<f64, 2, 3>, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit("2")
    }

    fn reverse_ad_3(&self, _: &SMatrix<f64, 3, 3>, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit("3")
    }

    fn reverse_ad_4(&self, _: &SMatrix<f64, 4, 3>, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit("4")
    }

    fn reverse_ad_dyn_rows(&self, dfdt: &DynRowsMatrix<3>, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit(&format!("dyn_rows({})", dfdt.nrows()))
    }

    fn reverse_ad_dyn(&self, _: &DMatrix<f64>, _: &mut JacobianMap) -> Result<(), Error> {
        self.hit("dyn")
    }
}

/// Generic record that writes `dF/dT` straight into one key and logs the row family.
struct Passthrough {
    key: Key,
    kinds: RefCell<Vec<RowKind>>,
}

impl Passthrough {
    fn new(key: Key) -> Self {
        Passthrough {
            key,
            kinds: RefCell::new(Vec::new()),
        }
    }
}

impl ReverseAd<3> for Passthrough {
    fn print(&self, indent: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{indent}Passthrough")
    }

    fn start_reverse_ad(&self, jacobians: &mut JacobianMap) -> Result<(), Error> {
        jacobians.add(self.key, &Matrix3::identity())
    }

    fn reverse_ad<R: Rows>(&self, dfdt: &R::Block<3>, jacobians: &mut JacobianMap) -> Result<(), Error> {
        self.kinds.borrow_mut().push(R::KIND);
        R::accumulate::<3>(jacobians, self.key, dfdt)
    }
}

fn block(rows: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, 3, |r, c| (r * 3 + c) as f64 + 0.5)
}

#[test]
fn static_rows_reach_their_own_slot() {
    let spy = SlotSpy::default();
    let record: &dyn CallRecord<3> = &spy;
    let mut jm = JacobianMap::new(0, []);

    record.reverse_ad(&SMatrix::<f64, 1, 3>::zeros(), &mut jm).unwrap();
    record.reverse_ad(&SMatrix::<f64, 2, 3>::zeros(), &mut jm).unwrap();
    record.reverse_ad(&SMatrix::<f64, 3, 3>::zeros(), &mut jm).unwrap();
    record.reverse_ad(&SMatrix::<f64, 4, 3>::zeros(), &mut jm).unwrap();
    record.reverse_ad(&SMatrix::<f64, 7, 3>::zeros(), &mut jm).unwrap();
    record
        .reverse_ad(&DynRowsMatrix::<3>::zeros_generic(Dyn(6), nalgebra::Const::<3>), &mut jm)
        .unwrap();
    record.reverse_ad(&DMatrix::<f64>::zeros(2, 3), &mut jm).unwrap();

    assert_eq!(
        *spy.calls.borrow(),
        ["1", "2", "3", "4", "dyn_rows(7)", "dyn_rows(6)", "dyn"]
    );
}

#[test]
fn five_rows_is_the_first_widened_count() {
    assert_eq!(MAX_VIRTUAL_STATIC_ROWS, 4);
    let spy = SlotSpy::default();
    let record: &dyn CallRecord<3> = &spy;
    let mut jm = JacobianMap::new(0, []);
    record.reverse_ad(&SMatrix::<f64, 5, 3>::zeros(), &mut jm).unwrap();
    assert_eq!(*spy.calls.borrow(), ["dyn_rows(5)"]);
}

#[test]
fn erased_block_with_wrong_columns_is_rejected() {
    let spy = SlotSpy::default();
    let record: &dyn CallRecord<3> = &spy;
    let mut jm = JacobianMap::new(2, [(Key(0), 3)]);
    let err = record.reverse_ad(&DMatrix::<f64>::zeros(2, 4), &mut jm).unwrap_err();
    assert!(matches!(err, Error::ContractViolation { expected: 3, actual: 4 }));
    assert!(spy.calls.borrow().is_empty());
}

#[test]
fn adapter_forwards_row_family() {
    let node = Passthrough::new(Key(1));
    let record: &dyn CallRecord<3> = &node;

    let mut jm2 = JacobianMap::new(2, [(Key(1), 3)]);
    record.reverse_ad(&SMatrix::<f64, 2, 3>::zeros(), &mut jm2).unwrap();
    let mut jm7 = JacobianMap::new(7, [(Key(1), 3)]);
    record.reverse_ad(&SMatrix::<f64, 7, 3>::zeros(), &mut jm7).unwrap();
    let mut jmd = JacobianMap::new(3, [(Key(1), 3)]);
    record.reverse_ad(&block(3), &mut jmd).unwrap();

    assert_eq!(
        *node.kinds.borrow(),
        [RowKind::Static(2), RowKind::DynamicRows, RowKind::Dynamic]
    );
}

#[test]
fn every_path_writes_the_same_values() {
    let node = Passthrough::new(Key(1));
    let record: &dyn CallRecord<3> = &node;

    for rows in [1, 2, 3, 4, 7] {
        let expected = block(rows);

        let mut erased = JacobianMap::new(rows, [(Key(1), 3)]);
        record.reverse_ad(&expected, &mut erased).unwrap();
        assert_eq!(erased.block(Key(1)).unwrap(), expected);

        let dyn_rows = DynRowsMatrix::<3>::from_column_slice_generic(
            Dyn(rows),
            nalgebra::Const::<3>,
            expected.as_slice(),
        );
        let mut widened = JacobianMap::new(rows, [(Key(1), 3)]);
        record.reverse_ad(&dyn_rows, &mut widened).unwrap();
        assert_eq!(widened.matrix(), erased.matrix());
    }

    let fixed = SMatrix::<f64, 7, 3>::from_fn(|r, c| (r * 3 + c) as f64 + 0.5);
    let mut jm = JacobianMap::new(7, [(Key(1), 3)]);
    record.reverse_ad(&fixed, &mut jm).unwrap();
    assert_eq!(jm.block(Key(1)).unwrap(), fixed);

    let two = Matrix2x3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
    let mut jm = JacobianMap::new(2, [(Key(1), 3)]);
    record.reverse_ad(&two, &mut jm).unwrap();
    assert_eq!(jm.block(Key(1)).unwrap(), two);
}

#[test]
fn unknown_key_surfaces_from_a_leaf() {
    let node = Passthrough::new(Key(9));
    let record: &dyn CallRecord<3> = &node;
    let mut jm = JacobianMap::new(1, [(Key(1), 3)]);
    let err = record.reverse_ad(&SMatrix::<f64, 1, 3>::zeros(), &mut jm).unwrap_err();
    assert!(matches!(err, Error::UnknownJacobianKey(Key(9))));
}

#[test]
fn unary_chain_through_trace() {
    // T = A·x with A 2×3, F = B·T with B 1×2
    let a = Matrix2x3::new(1.0, 2.0, 0.0, 0.0, -1.0, 3.0);
    let trace: ExecutionTrace<2> =
        ExecutionTrace::function(UnaryRecord::new(ExecutionTrace::<3>::Leaf(Key(0)), a));

    let start = trace.jacobians([(Key(0), 3)]).unwrap();
    assert_eq!(start.block(Key(0)).unwrap(), a);

    let b = SMatrix::<f64, 1, 2>::new(2.0, -1.0);
    let mut jm = JacobianMap::new(1, [(Key(0), 3)]);
    trace.reverse_ad(&b, &mut jm).unwrap();
    let expected = b * a;
    assert_relative_eq!(
        jm.block(Key(0)).unwrap().into_owned(),
        DMatrix::from_column_slice(1, 3, expected.as_slice()),
        epsilon = 1e-12
    );
}

#[test]
fn binary_record_accumulates_shared_leaf() {
    // T = 2x + 3x over the same leaf: both branches add into one slot
    let trace: ExecutionTrace<1> = ExecutionTrace::function(BinaryRecord::new(
        ExecutionTrace::<1>::Leaf(Key(4)),
        SMatrix::<f64, 1, 1>::new(2.0),
        ExecutionTrace::<1>::Leaf(Key(4)),
        SMatrix::<f64, 1, 1>::new(3.0),
    ));
    let jm = trace.jacobians([(Key(4), 1)]).unwrap();
    assert_eq!(jm.block(Key(4)).unwrap()[(0, 0)], 5.0);

    let mut wide = JacobianMap::new(6, [(Key(4), 1)]);
    trace
        .reverse_ad(&SMatrix::<f64, 6, 1>::from_element(1.0), &mut wide)
        .unwrap();
    assert!(wide.matrix().iter().all(|&v| v == 5.0));
}

#[test]
fn constant_branch_is_ignored() {
    let trace: ExecutionTrace<2> = ExecutionTrace::function(BinaryRecord::new(
        ExecutionTrace::<2>::Constant,
        SMatrix::<f64, 2, 2>::identity(),
        ExecutionTrace::<2>::Leaf(Key(1)),
        SMatrix::<f64, 2, 2>::identity() * 4.0,
    ));
    let jm = trace.jacobians([(Key(1), 2)]).unwrap();
    assert_eq!(jm.block(Key(1)).unwrap(), SMatrix::<f64, 2, 2>::identity() * 4.0);
}

#[test]
fn failed_second_branch_leaves_map_unchanged() {
    // T = 2x + 3y where only x is tracked
    let trace: ExecutionTrace<1> = ExecutionTrace::function(BinaryRecord::new(
        ExecutionTrace::<1>::Leaf(Key(1)),
        SMatrix::<f64, 1, 1>::new(2.0),
        ExecutionTrace::<1>::Leaf(Key(99)),
        SMatrix::<f64, 1, 1>::new(3.0),
    ));
    let mut jm = JacobianMap::new(1, [(Key(1), 1)]);

    let err = trace.start_reverse_ad(&mut jm).unwrap_err();
    assert!(matches!(err, Error::UnknownJacobianKey(Key(99))));
    assert_eq!(jm.matrix()[(0, 0)], 0.0);

    let err = trace
        .reverse_ad(&SMatrix::<f64, 1, 1>::new(1.0), &mut jm)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownJacobianKey(Key(99))));
    let err = trace
        .reverse_ad(&DMatrix::<f64>::from_element(1, 1, 1.0), &mut jm)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownJacobianKey(Key(99))));
    assert_eq!(jm.matrix()[(0, 0)], 0.0);
}

#[test]
fn nested_failure_keeps_earlier_sibling_writes_out() {
    // (2x + 3x) + 5y: the inner record succeeds before the outer one fails
    let inner: ExecutionTrace<1> = ExecutionTrace::function(BinaryRecord::new(
        ExecutionTrace::<1>::Leaf(Key(1)),
        SMatrix::<f64, 1, 1>::new(2.0),
        ExecutionTrace::<1>::Leaf(Key(1)),
        SMatrix::<f64, 1, 1>::new(3.0),
    ));
    let outer: ExecutionTrace<1> = ExecutionTrace::function(BinaryRecord::new(
        inner,
        SMatrix::<f64, 1, 1>::new(1.0),
        ExecutionTrace::<1>::Leaf(Key(2)),
        SMatrix::<f64, 1, 1>::new(5.0),
    ));
    let mut jm = JacobianMap::new(1, [(Key(1), 1)]);
    assert!(outer.start_reverse_ad(&mut jm).is_err());
    assert_eq!(jm.matrix()[(0, 0)], 0.0);
}

#[test]
fn erased_leaf_checks_columns_against_trace_dimension() {
    let trace = ExecutionTrace::<3>::Leaf(Key(0));
    let mut jm = JacobianMap::new(2, [(Key(0), 4)]);
    let err = trace
        .reverse_ad(&DMatrix::<f64>::zeros(2, 4), &mut jm)
        .unwrap_err();
    assert!(matches!(err, Error::ContractViolation { expected: 3, actual: 4 }));
    assert!(jm.matrix().iter().all(|&v| v == 0.0));
}

#[test]
fn erased_generic_call_reports_column_mismatch() {
    type Scale = UnaryRecord<3, 2>;
    let record: Scale = UnaryRecord::new(ExecutionTrace::<2>::Leaf(Key(0)), SMatrix::zeros());
    let mut jm = JacobianMap::new(2, [(Key(0), 2)]);

    let wide = DMatrix::<f64>::zeros(2, 4);
    let err = <Scale as ReverseAd<3>>::reverse_ad::<Erased>(&record, &wide, &mut jm).unwrap_err();
    assert!(matches!(err, Error::ContractViolation { expected: 3, actual: 4 }));

    let fitting = DMatrix::<f64>::zeros(2, 3);
    <Scale as ReverseAd<3>>::reverse_ad::<Erased>(&record, &fitting, &mut jm).unwrap();
}
