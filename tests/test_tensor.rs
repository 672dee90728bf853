// Tests for shapes, owned tensors and borrowed views.

use rust_cnn_engine::tensor::{Shape, Tensor, TensorView, TensorViewMut};

// ============================================================================
// Shape
// ============================================================================

#[test]
fn test_shape_constructors_agree() {
    assert_eq!(Shape::new(&[2, 3, 4]), Shape::d3(2, 3, 4));
    assert_eq!(Shape::d4(1, 2, 3, 4).flatten_size(), 24);
    assert_eq!(Shape::d2(5, 7).dims(), &[5, 7]);
    assert_eq!(Shape::d3(1, 28, 28).to_string(), "[1, 28, 28]");
}

#[test]
fn test_batch_axis_round_trip() {
    let base = Shape::d3(8, 12, 12);
    let batched = base.with_batch(17);
    assert_eq!(batched.dims(), &[17, 8, 12, 12]);
    assert_eq!(batched.without_batch(), base);
    assert_eq!(Shape::d1(4).without_batch(), Shape::d1(1));
}

#[test]
fn test_offsets_per_rank() {
    assert_eq!(Shape::d1(5).offset([3]), 3);
    assert_eq!(Shape::d2(3, 4).offset([2, 1]), 9);
    assert_eq!(Shape::d3(2, 3, 4).offset([1, 2, 3]), 23);
    assert_eq!(Shape::d4(2, 3, 4, 5).offset([1, 0, 2, 4]), 60 + 10 + 4);
}

#[test]
#[should_panic(expected = "does not match rank")]
fn test_offset_arity_checked() {
    Shape::d2(3, 3).offset([1, 1, 1]);
}

#[test]
#[should_panic(expected = "Cannot add a batch axis")]
fn test_rank_five_rejected() {
    Shape::d4(1, 1, 1, 1).with_batch(2);
}

// ============================================================================
// Views
// ============================================================================

#[test]
fn test_view_indexing_and_samples() {
    let data: Vec<f64> = (0..12).map(|i| i as f64).collect();
    let view = TensorView::new(&data, Shape::d3(2, 2, 3));

    assert_eq!(view[[1, 0, 2]], 8.0);
    assert_eq!(view.batch_size(), 2);
    assert_eq!(view.sample(1), &data[6..]);

    let flat = view.reshaped(Shape::d2(2, 6));
    assert_eq!(flat[[1, 5]], 11.0);
}

#[test]
#[should_panic(expected = "does not cover")]
fn test_view_size_checked() {
    let data = vec![0.0; 5];
    TensorView::new(&data, Shape::d2(2, 3));
}

#[test]
fn test_mutable_view_writes_through() {
    let mut data = vec![0.0; 6];
    {
        let mut view = TensorViewMut::new(&mut data, Shape::d2(2, 3));
        view[[1, 2]] = 4.0;
        view.data_mut()[0] = 1.0;
        assert_eq!(view.as_view()[[1, 2]], 4.0);
    }
    assert_eq!(data, vec![1.0, 0.0, 0.0, 0.0, 0.0, 4.0]);
}

// ============================================================================
// Owned Tensor
// ============================================================================

#[test]
fn test_reset_resize_reshape() {
    let mut t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::d2(2, 2));

    t.reshape(Shape::d1(4));
    assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);

    t.resize(Shape::d2(3, 2));
    assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);

    t.reset(Shape::d1(3));
    assert_eq!(t.data(), &[0.0, 0.0, 0.0]);
    assert_eq!(t.shape(), Shape::d1(3));
}

#[test]
#[should_panic(expected = "Cannot reshape")]
fn test_reshape_checks_size() {
    let mut t = Tensor::zeros(Shape::d1(4));
    t.reshape(Shape::d1(5));
}

#[test]
fn test_views_share_storage() {
    let mut t = Tensor::zeros(Shape::d2(2, 2));
    t.view_mut()[[0, 1]] = 3.0;
    t[[1, 0]] = 2.0;
    assert_eq!(t.view()[[0, 1]], 3.0);
    assert_eq!(t.into_vec(), vec![0.0, 3.0, 2.0, 0.0]);
}
