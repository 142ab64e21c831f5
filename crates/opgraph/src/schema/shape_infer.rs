//! Shape propagation rules attached to operator schemas.
//!
//! Rules fill the `shape` field of the op's output tensors from its input
//! tensors and attributes. Unknown extents (`-1`) propagate; an input with
//! no recorded shape leaves the outputs untouched.

use crate::error::{GraphError, GraphResult};
use crate::ir::op::Op;
use crate::ir::tensor::{LogicalTensor, DIM_UNKNOWN};

fn known(dim: i64) -> Option<i64> {
    (dim != DIM_UNKNOWN).then_some(dim)
}

/// Output 0 takes input 0's shape verbatim.
pub fn identity_shape(
    _op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let Some(src) = inputs.first().and_then(|t| t.shape.clone()) else {
        return Ok(());
    };
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(src);
    }
    Ok(())
}

/// Elementwise binary rule with numpy-style broadcasting.
pub fn broadcast_shape(
    _op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let (Some(lhs), Some(rhs)) = (
        inputs.first().and_then(|t| t.shape.as_deref()),
        inputs.get(1).and_then(|t| t.shape.as_deref()),
    ) else {
        return Ok(());
    };
    let merged = broadcast_dims(lhs, rhs)?;
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(merged);
    }
    Ok(())
}

fn broadcast_dims(lhs: &[i64], rhs: &[i64]) -> GraphResult<Vec<i64>> {
    let rank = lhs.len().max(rhs.len());
    let mut merged = Vec::with_capacity(rank);
    for axis in 0..rank {
        let a = axis
            .checked_sub(rank - lhs.len())
            .map_or(1, |idx| lhs[idx]);
        let b = axis
            .checked_sub(rank - rhs.len())
            .map_or(1, |idx| rhs[idx]);
        let dim = match (known(a), known(b)) {
            (Some(1), Some(d)) | (Some(d), Some(1)) => d,
            (Some(a), Some(b)) if a == b => a,
            (Some(_), Some(_)) => {
                return Err(GraphError::invalid_argument(format!(
                    "cannot broadcast extents {a} and {b}"
                )))
            }
            _ => DIM_UNKNOWN,
        };
        merged.push(dim);
    }
    Ok(merged)
}

/// Batch-norm forward rule: data output mirrors the data input, statistic
/// outputs mirror the per-channel inputs.
pub fn batch_norm_shape(
    _op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    if let (Some(src), Some(out)) = (
        inputs.first().and_then(|t| t.shape.clone()),
        outputs.first_mut(),
    ) {
        out.shape = Some(src);
    }
    let channel = inputs.get(1).and_then(|t| t.shape.clone());
    for out in outputs.iter_mut().skip(1) {
        out.shape = channel.clone();
    }
    Ok(())
}

/// Convolution forward rule over NXC/NCX data and XIO/OIX filters.
pub fn conv_shape(
    op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let (Some(data), Some(filter)) = (
        inputs.first().and_then(|t| t.shape.as_deref()),
        inputs.get(1).and_then(|t| t.shape.as_deref()),
    ) else {
        return Ok(());
    };

    let auto_pad: &String = op.get_attr("auto_pad")?;
    if auto_pad != "None" {
        return Err(GraphError::unsupported(format!(
            "auto_pad mode {auto_pad} in shape inference"
        )));
    }

    let strides: &Vec<i64> = op.get_attr("strides")?;
    let pads_begin: &Vec<i64> = op.get_attr("pads_begin")?;
    let pads_end: &Vec<i64> = op.get_attr("pads_end")?;
    let dilations: &Vec<i64> = op.get_attr("dilations")?;
    let data_format: &String = op.get_attr("data_format")?;
    let filter_format: &String = op.get_attr("filter_format")?;

    if data.len() < 3 {
        return Err(GraphError::invalid_argument(
            "convolution data must have batch, channel, and spatial extents",
        ));
    }
    let spatial_rank = data.len() - 2;
    if strides.len() != spatial_rank
        || pads_begin.len() != spatial_rank
        || pads_end.len() != spatial_rank
        || dilations.len() != spatial_rank
    {
        return Err(GraphError::invalid_argument(
            "convolution attribute rank does not match data rank",
        ));
    }

    if filter.len() != spatial_rank + 2 {
        return Err(GraphError::invalid_argument(
            "convolution filter rank does not match data rank",
        ));
    }

    let batch = data[0];
    let spatial_in: &[i64] = match data_format.as_str() {
        "NXC" => &data[1..1 + spatial_rank],
        "NCX" => &data[2..],
        other => {
            return Err(GraphError::invalid_argument(format!(
                "unknown data_format {other}"
            )))
        }
    };
    let out_channels = match filter_format.as_str() {
        "XIO" => *filter.last().ok_or_else(|| {
            GraphError::invalid_argument("convolution filter shape is empty")
        })?,
        "OIX" => filter[0],
        other => {
            return Err(GraphError::invalid_argument(format!(
                "unknown filter_format {other}"
            )))
        }
    };
    let kernel: Vec<i64> = match filter_format.as_str() {
        "XIO" => filter[..spatial_rank].to_vec(),
        _ => filter[2..].to_vec(),
    };

    let mut spatial_out = Vec::with_capacity(spatial_rank);
    for axis in 0..spatial_rank {
        let dim = match (known(spatial_in[axis]), known(kernel[axis])) {
            (Some(input), Some(k)) => {
                let window = (k - 1) * dilations[axis] + 1;
                (input + pads_begin[axis] + pads_end[axis] - window) / strides[axis] + 1
            }
            _ => DIM_UNKNOWN,
        };
        spatial_out.push(dim);
    }

    let mut shape = Vec::with_capacity(data.len());
    shape.push(batch);
    match data_format.as_str() {
        "NXC" => {
            shape.extend(spatial_out);
            shape.push(out_channels);
        }
        _ => {
            shape.push(out_channels);
            shape.extend(spatial_out);
        }
    }
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(shape);
    }
    Ok(())
}

/// MatMul contraction rule with broadcast batch dims and transpose flags.
pub fn matmul_shape(
    op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let (Some(a), Some(b)) = (
        inputs.first().and_then(|t| t.shape.as_deref()),
        inputs.get(1).and_then(|t| t.shape.as_deref()),
    ) else {
        return Ok(());
    };
    if a.len() < 2 || b.len() < 2 {
        return Err(GraphError::invalid_argument(
            "matmul operands must be at least rank 2",
        ));
    }

    let transpose_a: bool = *op.get_attr("transpose_a")?;
    let transpose_b: bool = *op.get_attr("transpose_b")?;

    let (m, ka) = if transpose_a {
        (a[a.len() - 1], a[a.len() - 2])
    } else {
        (a[a.len() - 2], a[a.len() - 1])
    };
    let (kb, n) = if transpose_b {
        (b[b.len() - 1], b[b.len() - 2])
    } else {
        (b[b.len() - 2], b[b.len() - 1])
    };
    if let (Some(ka), Some(kb)) = (known(ka), known(kb)) {
        if ka != kb {
            return Err(GraphError::invalid_argument(format!(
                "matmul contraction mismatch: {ka} vs {kb}"
            )));
        }
    }

    let mut shape = broadcast_dims(&a[..a.len() - 2], &b[..b.len() - 2])?;
    shape.push(m);
    shape.push(n);
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(shape);
    }
    Ok(())
}

/// Windowed pooling rule shared by max and average pooling.
pub fn pool_shape(
    op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let Some(data) = inputs.first().and_then(|t| t.shape.as_deref()) else {
        return Ok(());
    };
    let kernel: &Vec<i64> = op.get_attr("kernel")?;
    let strides: &Vec<i64> = op.get_attr("strides")?;
    let pads_begin: &Vec<i64> = op.get_attr("pads_begin")?;
    let pads_end: &Vec<i64> = op.get_attr("pads_end")?;
    let data_format: &String = op.get_attr("data_format")?;
    let rounding: &String = op.get_attr("rounding_type")?;

    if data.len() < 3 {
        return Err(GraphError::invalid_argument(
            "pooling data must have batch, channel, and spatial extents",
        ));
    }
    let spatial_rank = data.len() - 2;
    if kernel.len() != spatial_rank || strides.len() != spatial_rank {
        return Err(GraphError::invalid_argument(
            "pooling attribute rank does not match data rank",
        ));
    }

    let spatial_in: &[i64] = match data_format.as_str() {
        "NXC" => &data[1..1 + spatial_rank],
        _ => &data[2..],
    };
    let mut spatial_out = Vec::with_capacity(spatial_rank);
    for axis in 0..spatial_rank {
        let dim = match known(spatial_in[axis]) {
            Some(input) => {
                let padded = input + pads_begin[axis] + pads_end[axis] - kernel[axis];
                let extra = if rounding == "ceil" {
                    strides[axis] - 1
                } else {
                    0
                };
                (padded + extra) / strides[axis] + 1
            }
            None => DIM_UNKNOWN,
        };
        spatial_out.push(dim);
    }

    let mut shape = Vec::with_capacity(data.len());
    shape.push(data[0]);
    match data_format.as_str() {
        "NXC" => {
            shape.extend(spatial_out);
            shape.push(*data.last().unwrap_or(&DIM_UNKNOWN));
        }
        _ => {
            shape.push(data[1]);
            shape.extend(spatial_out);
        }
    }
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(shape);
    }
    Ok(())
}

/// Concatenation along `axis`; all other extents must agree.
pub fn concat_shape(
    op: &Op,
    inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let axis: i64 = *op.get_attr("axis")?;
    let Some(first) = inputs.first().and_then(|t| t.shape.as_deref()) else {
        return Ok(());
    };
    let rank = first.len() as i64;
    let axis = if axis < 0 { axis + rank } else { axis };
    if axis < 0 || axis >= rank {
        return Err(GraphError::invalid_argument(format!(
            "concat axis {axis} out of range for rank {rank}"
        )));
    }
    let axis = axis as usize;

    let mut shape = first.to_vec();
    let mut total = known(first[axis]);
    for tensor in &inputs[1..] {
        let Some(dims) = tensor.shape.as_deref() else {
            return Ok(());
        };
        if dims.len() != first.len() {
            return Err(GraphError::invalid_argument(
                "concat operands must agree on rank",
            ));
        }
        total = match (total, known(dims[axis])) {
            (Some(acc), Some(dim)) => Some(acc + dim),
            _ => None,
        };
    }
    shape[axis] = total.unwrap_or(DIM_UNKNOWN);
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(shape);
    }
    Ok(())
}

/// Static reshape: the target shape is the attribute value.
pub fn reshape_shape(
    op: &Op,
    _inputs: &[LogicalTensor],
    outputs: &mut Vec<LogicalTensor>,
) -> GraphResult<()> {
    let shape: &Vec<i64> = op.get_attr("shape")?;
    if let Some(out) = outputs.first_mut() {
        out.shape = Some(shape.clone());
    }
    Ok(())
}
