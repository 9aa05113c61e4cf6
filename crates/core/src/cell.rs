//! Recurrent cells: Elman (tanh/relu), LSTM, GRU, and a projected LSTM with
//! cell/projection clipping.
//!
//! Every cell advances one time step: `step(input, state) → (output, state)`.
//! Weights use the packed-gate layout (`weight_ih` is `(gates·hidden, in)`),
//! Xavier-uniform initialised; biases start at zero. The forward and backward
//! affine maps each carry their own bias.

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::init::Init;
use candle_nn::{ops, VarBuilder};

use bilm_common::{BiLmConfig, RnnMode};

// ── State ───────────────────────────────────────────────────────────────────

/// Recurrent state carried between steps: the emitted output `h` plus the
/// cell memory `c` for LSTM-family cells.
#[derive(Debug, Clone)]
pub struct RecState {
    pub h: Tensor,
    pub c: Option<Tensor>,
}

impl RecState {
    /// Cut the autograd history so the next chunk starts a fresh graph.
    pub fn detach(&self) -> Self {
        Self {
            h: self.h.detach(),
            c: self.c.as_ref().map(|c| c.detach()),
        }
    }
}

/// Xavier-uniform bound for a `(fan_out, fan_in)` weight.
fn xavier_uniform(fan_in: usize, fan_out: usize) -> Init {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

// ── Elman ───────────────────────────────────────────────────────────────────

/// Activation of the plain recurrent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElmanActivation {
    Tanh,
    Relu,
}

/// Plain recurrent cell: `h' = act(W_ih·x + b_ih + W_hh·h + b_hh)`.
pub struct ElmanCell {
    weight_ih: Tensor,
    weight_hh: Tensor,
    bias_ih: Tensor,
    bias_hh: Tensor,
    activation: ElmanActivation,
    hidden_size: usize,
    device: Device,
    dtype: DType,
}

impl ElmanCell {
    pub fn new(
        in_size: usize,
        hidden_size: usize,
        activation: ElmanActivation,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight_ih = vb.get_with_hints(
            (hidden_size, in_size),
            "weight_ih",
            xavier_uniform(in_size, hidden_size),
        )?;
        let weight_hh = vb.get_with_hints(
            (hidden_size, hidden_size),
            "weight_hh",
            xavier_uniform(hidden_size, hidden_size),
        )?;
        let bias_ih = vb.get_with_hints(hidden_size, "bias_ih", Init::Const(0.))?;
        let bias_hh = vb.get_with_hints(hidden_size, "bias_hh", Init::Const(0.))?;
        Ok(Self {
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
            activation,
            hidden_size,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    pub fn zero_state(&self, batch_size: usize) -> Result<RecState> {
        let h = Tensor::zeros((batch_size, self.hidden_size), self.dtype, &self.device)?;
        Ok(RecState { h, c: None })
    }

    pub fn step(&self, input: &Tensor, state: &RecState) -> Result<(Tensor, RecState)> {
        let pre = input
            .matmul(&self.weight_ih.t()?)?
            .broadcast_add(&self.bias_ih)?
            .add(&state.h.matmul(&self.weight_hh.t()?)?)?
            .broadcast_add(&self.bias_hh)?;
        let h = match self.activation {
            ElmanActivation::Tanh => pre.tanh()?,
            ElmanActivation::Relu => pre.relu()?,
        };
        Ok((h.clone(), RecState { h, c: None }))
    }
}

// ── LSTM ────────────────────────────────────────────────────────────────────

/// LSTM cell with the packed i/f/g/o gate layout.
pub struct LstmCell {
    weight_ih: Tensor, // (4·hidden, in)
    weight_hh: Tensor, // (4·hidden, hidden)
    bias_ih: Tensor,
    bias_hh: Tensor,
    hidden_size: usize,
    device: Device,
    dtype: DType,
}

impl LstmCell {
    pub fn new(in_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let weight_ih = vb.get_with_hints(
            (4 * hidden_size, in_size),
            "weight_ih",
            xavier_uniform(in_size, 4 * hidden_size),
        )?;
        let weight_hh = vb.get_with_hints(
            (4 * hidden_size, hidden_size),
            "weight_hh",
            xavier_uniform(hidden_size, 4 * hidden_size),
        )?;
        let bias_ih = vb.get_with_hints(4 * hidden_size, "bias_ih", Init::Const(0.))?;
        let bias_hh = vb.get_with_hints(4 * hidden_size, "bias_hh", Init::Const(0.))?;
        Ok(Self {
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
            hidden_size,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    pub fn zero_state(&self, batch_size: usize) -> Result<RecState> {
        let h = Tensor::zeros((batch_size, self.hidden_size), self.dtype, &self.device)?;
        let c = Tensor::zeros((batch_size, self.hidden_size), self.dtype, &self.device)?;
        Ok(RecState { h, c: Some(c) })
    }

    pub fn step(&self, input: &Tensor, state: &RecState) -> Result<(Tensor, RecState)> {
        let c_prev = match &state.c {
            Some(c) => c,
            None => candle_core::bail!("lstm state is missing its cell memory"),
        };
        let gates = input
            .matmul(&self.weight_ih.t()?)?
            .broadcast_add(&self.bias_ih)?
            .add(&state.h.matmul(&self.weight_hh.t()?)?)?
            .broadcast_add(&self.bias_hh)?;
        let chunks = gates.chunk(4, 1)?;
        let i = ops::sigmoid(&chunks[0])?;
        let f = ops::sigmoid(&chunks[1])?;
        let g = chunks[2].tanh()?;
        let o = ops::sigmoid(&chunks[3])?;
        let c = ((&f * c_prev)? + (&i * &g)?)?;
        let h = (&o * c.tanh()?)?;
        Ok((h.clone(), RecState { h, c: Some(c) }))
    }
}

// ── GRU ─────────────────────────────────────────────────────────────────────

/// GRU cell with the packed r/z/n gate layout.
pub struct GruCell {
    weight_ih: Tensor, // (3·hidden, in)
    weight_hh: Tensor, // (3·hidden, hidden)
    bias_ih: Tensor,
    bias_hh: Tensor,
    hidden_size: usize,
    device: Device,
    dtype: DType,
}

impl GruCell {
    pub fn new(in_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let weight_ih = vb.get_with_hints(
            (3 * hidden_size, in_size),
            "weight_ih",
            xavier_uniform(in_size, 3 * hidden_size),
        )?;
        let weight_hh = vb.get_with_hints(
            (3 * hidden_size, hidden_size),
            "weight_hh",
            xavier_uniform(hidden_size, 3 * hidden_size),
        )?;
        let bias_ih = vb.get_with_hints(3 * hidden_size, "bias_ih", Init::Const(0.))?;
        let bias_hh = vb.get_with_hints(3 * hidden_size, "bias_hh", Init::Const(0.))?;
        Ok(Self {
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
            hidden_size,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    pub fn zero_state(&self, batch_size: usize) -> Result<RecState> {
        let h = Tensor::zeros((batch_size, self.hidden_size), self.dtype, &self.device)?;
        Ok(RecState { h, c: None })
    }

    pub fn step(&self, input: &Tensor, state: &RecState) -> Result<(Tensor, RecState)> {
        let ih = input
            .matmul(&self.weight_ih.t()?)?
            .broadcast_add(&self.bias_ih)?
            .chunk(3, 1)?;
        let hh = state
            .h
            .matmul(&self.weight_hh.t()?)?
            .broadcast_add(&self.bias_hh)?
            .chunk(3, 1)?;
        let r = ops::sigmoid(&(&ih[0] + &hh[0])?)?;
        let z = ops::sigmoid(&(&ih[1] + &hh[1])?)?;
        let n = (&ih[2] + (&r * &hh[2])?)?.tanh()?;
        // h' = (1 - z)·n + z·h
        let h = ((&z * &state.h)? - ((&z - 1.0)? * &n)?)?;
        Ok((h.clone(), RecState { h, c: None }))
    }
}

// ── Projected LSTM with clipping ────────────────────────────────────────────

/// Projected LSTM cell. The recurrent path runs through a linear projection
/// `r = W_hr·h` (no bias); the cell memory and the projected output can each
/// be hard-clamped to a symmetric bound. The clamp's gradient is zero outside
/// the bounds; absent bounds mean pass-through.
pub struct LstmpCell {
    weight_ih: Tensor, // (4·hidden, in)
    weight_hh: Tensor, // (4·hidden, projection)
    weight_hr: Tensor, // (projection, hidden)
    bias_ih: Tensor,
    bias_hh: Tensor,
    hidden_size: usize,
    projection_size: usize,
    cell_clip: Option<f64>,
    projection_clip: Option<f64>,
    device: Device,
    dtype: DType,
}

impl LstmpCell {
    pub fn new(
        in_size: usize,
        hidden_size: usize,
        projection_size: usize,
        cell_clip: Option<f64>,
        projection_clip: Option<f64>,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight_ih = vb.get_with_hints(
            (4 * hidden_size, in_size),
            "weight_ih",
            xavier_uniform(in_size, 4 * hidden_size),
        )?;
        let weight_hh = vb.get_with_hints(
            (4 * hidden_size, projection_size),
            "weight_hh",
            xavier_uniform(projection_size, 4 * hidden_size),
        )?;
        let weight_hr = vb.get_with_hints(
            (projection_size, hidden_size),
            "weight_hr",
            xavier_uniform(hidden_size, projection_size),
        )?;
        let bias_ih = vb.get_with_hints(4 * hidden_size, "bias_ih", Init::Const(0.))?;
        let bias_hh = vb.get_with_hints(4 * hidden_size, "bias_hh", Init::Const(0.))?;
        Ok(Self {
            weight_ih,
            weight_hh,
            weight_hr,
            bias_ih,
            bias_hh,
            hidden_size,
            projection_size,
            cell_clip,
            projection_clip,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    /// Recurrent component has the projection size; cell memory keeps the
    /// full hidden size.
    pub fn zero_state(&self, batch_size: usize) -> Result<RecState> {
        let h = Tensor::zeros((batch_size, self.projection_size), self.dtype, &self.device)?;
        let c = Tensor::zeros((batch_size, self.hidden_size), self.dtype, &self.device)?;
        Ok(RecState { h, c: Some(c) })
    }

    pub fn step(&self, input: &Tensor, state: &RecState) -> Result<(Tensor, RecState)> {
        let c_prev = match &state.c {
            Some(c) => c,
            None => candle_core::bail!("lstmp state is missing its cell memory"),
        };
        let gates = input
            .matmul(&self.weight_ih.t()?)?
            .broadcast_add(&self.bias_ih)?
            .add(&state.h.matmul(&self.weight_hh.t()?)?)?
            .broadcast_add(&self.bias_hh)?;
        let chunks = gates.chunk(4, 1)?;
        let i = ops::sigmoid(&chunks[0])?;
        let f = ops::sigmoid(&chunks[1])?;
        let g = chunks[2].tanh()?;
        let o = ops::sigmoid(&chunks[3])?;
        let mut c = ((&f * c_prev)? + (&i * &g)?)?;
        if let Some(bound) = self.cell_clip {
            c = c.clamp(-bound, bound)?;
        }
        let h = (&o * c.tanh()?)?;
        let mut r = h.matmul(&self.weight_hr.t()?)?;
        if let Some(bound) = self.projection_clip {
            r = r.clamp(-bound, bound)?;
        }
        Ok((r.clone(), RecState { h: r, c: Some(c) }))
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────────

/// Dispatch over the cell families, constructed from a [`BiLmConfig`].
pub enum RnnCell {
    Elman(ElmanCell),
    Lstm(LstmCell),
    Gru(GruCell),
    Lstmp(LstmpCell),
}

impl RnnCell {
    pub fn new(config: &BiLmConfig, in_size: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        match config.mode {
            RnnMode::RnnTanh => Ok(Self::Elman(ElmanCell::new(
                in_size,
                hidden,
                ElmanActivation::Tanh,
                vb,
            )?)),
            RnnMode::RnnRelu => Ok(Self::Elman(ElmanCell::new(
                in_size,
                hidden,
                ElmanActivation::Relu,
                vb,
            )?)),
            RnnMode::Lstm => Ok(Self::Lstm(LstmCell::new(in_size, hidden, vb)?)),
            RnnMode::Gru => Ok(Self::Gru(GruCell::new(in_size, hidden, vb)?)),
            RnnMode::Lstmp => {
                let projection = match config.projection_size {
                    Some(p) => p,
                    None => candle_core::bail!("lstmp cells need a projection size"),
                };
                Ok(Self::Lstmp(LstmpCell::new(
                    in_size,
                    hidden,
                    projection,
                    config.cell_clip,
                    config.projection_clip,
                    vb,
                )?))
            }
        }
    }

    pub fn zero_state(&self, batch_size: usize) -> Result<RecState> {
        match self {
            Self::Elman(c) => c.zero_state(batch_size),
            Self::Lstm(c) => c.zero_state(batch_size),
            Self::Gru(c) => c.zero_state(batch_size),
            Self::Lstmp(c) => c.zero_state(batch_size),
        }
    }

    pub fn step(&self, input: &Tensor, state: &RecState) -> Result<(Tensor, RecState)> {
        match self {
            Self::Elman(c) => c.step(input, state),
            Self::Lstm(c) => c.step(input, state),
            Self::Gru(c) => c.step(input, state),
            Self::Lstmp(c) => c.step(input, state),
        }
    }

    /// Feature size of the emitted output (projection size for `lstmp`).
    pub fn output_size(&self) -> usize {
        match self {
            Self::Elman(c) => c.hidden_size,
            Self::Lstm(c) => c.hidden_size,
            Self::Gru(c) => c.hidden_size,
            Self::Lstmp(c) => c.projection_size,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::{VarBuilder, VarMap};

    fn cpu_vb(varmap: &VarMap) -> VarBuilder {
        VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu)
    }

    /// Overwrite a named parameter with fixed values.
    fn set_var(varmap: &VarMap, name: &str, values: Tensor) {
        varmap
            .data()
            .lock()
            .unwrap()
            .get(name)
            .unwrap()
            .set(&values)
            .unwrap();
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn scalar_of(t: &Tensor) -> f32 {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()[0]
    }

    /// Shared fixed weights for the 1×1 LSTM/LSTMP reference tests.
    fn set_gate_weights(varmap: &VarMap, hh_name: &str) {
        let dev = Device::Cpu;
        set_var(
            varmap,
            "weight_ih",
            Tensor::new(&[[0.5f32], [0.6], [0.7], [0.8]], &dev).unwrap(),
        );
        set_var(
            varmap,
            hh_name,
            Tensor::new(&[[0.9f32], [1.0], [1.1], [1.2]], &dev).unwrap(),
        );
        set_var(
            varmap,
            "bias_ih",
            Tensor::new(&[0.1f32, 0.2, 0.3, 0.4], &dev).unwrap(),
        );
        set_var(
            varmap,
            "bias_hh",
            Tensor::new(&[0.05f32, 0.06, 0.07, 0.08], &dev).unwrap(),
        );
    }

    /// Gate pre-activations for x = 1.5, recurrent = 0.3 under the shared
    /// weights: i_pre 1.17, f_pre 1.46, g_pre 1.75, o_pre 2.04.
    fn reference_cell_update(c_prev: f64) -> (f64, f64) {
        let i = sigmoid(1.17);
        let f = sigmoid(1.46);
        let g = (1.75f64).tanh();
        let o = sigmoid(2.04);
        let c = f * c_prev + i * g;
        let h = o * c.tanh();
        (c, h)
    }

    #[test]
    fn elman_tanh_step_matches_reference() {
        let varmap = VarMap::new();
        let cell = ElmanCell::new(1, 1, ElmanActivation::Tanh, cpu_vb(&varmap)).unwrap();
        let dev = Device::Cpu;
        set_var(&varmap, "weight_ih", Tensor::new(&[[0.5f32]], &dev).unwrap());
        set_var(&varmap, "weight_hh", Tensor::new(&[[0.25f32]], &dev).unwrap());
        set_var(&varmap, "bias_ih", Tensor::new(&[0.1f32], &dev).unwrap());
        set_var(&varmap, "bias_hh", Tensor::new(&[0.05f32], &dev).unwrap());

        let x = Tensor::new(&[[2.0f32]], &dev).unwrap();
        let state = RecState {
            h: Tensor::new(&[[0.4f32]], &dev).unwrap(),
            c: None,
        };
        let (out, next) = cell.step(&x, &state).unwrap();
        // tanh(0.5·2 + 0.1 + 0.25·0.4 + 0.05) = tanh(1.25)
        let expected = (1.25f64).tanh() as f32;
        assert!((scalar_of(&out) - expected).abs() < 1e-6);
        assert!((scalar_of(&next.h) - expected).abs() < 1e-6);
        assert!(next.c.is_none());
    }

    #[test]
    fn lstm_step_matches_reference() {
        let varmap = VarMap::new();
        let cell = LstmCell::new(1, 1, cpu_vb(&varmap)).unwrap();
        set_gate_weights(&varmap, "weight_hh");

        let dev = Device::Cpu;
        let x = Tensor::new(&[[1.5f32]], &dev).unwrap();
        let state = RecState {
            h: Tensor::new(&[[0.3f32]], &dev).unwrap(),
            c: Some(Tensor::new(&[[0.2f32]], &dev).unwrap()),
        };
        let (out, next) = cell.step(&x, &state).unwrap();
        let (c, h) = reference_cell_update(0.2);
        assert!((scalar_of(&out) - h as f32).abs() < 1e-5);
        assert!((scalar_of(next.c.as_ref().unwrap()) - c as f32).abs() < 1e-5);
    }

    #[test]
    fn gru_step_matches_reference() {
        let varmap = VarMap::new();
        let cell = GruCell::new(1, 1, cpu_vb(&varmap)).unwrap();
        let dev = Device::Cpu;
        set_var(
            &varmap,
            "weight_ih",
            Tensor::new(&[[0.2f32], [0.3], [0.4]], &dev).unwrap(),
        );
        set_var(
            &varmap,
            "weight_hh",
            Tensor::new(&[[0.5f32], [0.6], [0.7]], &dev).unwrap(),
        );
        set_var(
            &varmap,
            "bias_ih",
            Tensor::new(&[0.01f32, 0.02, 0.03], &dev).unwrap(),
        );
        set_var(
            &varmap,
            "bias_hh",
            Tensor::new(&[0.04f32, 0.05, 0.06], &dev).unwrap(),
        );

        let x = Tensor::new(&[[1.0f32]], &dev).unwrap();
        let state = RecState {
            h: Tensor::new(&[[0.5f32]], &dev).unwrap(),
            c: None,
        };
        let (out, _) = cell.step(&x, &state).unwrap();

        // ih = [0.21, 0.32, 0.43], hh = [0.29, 0.35, 0.41]
        let r = sigmoid(0.21 + 0.29);
        let z = sigmoid(0.32 + 0.35);
        let n = (0.43 + r * 0.41).tanh();
        let expected = (z * 0.5 + (1.0 - z) * n) as f32;
        assert!((scalar_of(&out) - expected).abs() < 1e-5);
    }

    #[test]
    fn lstmp_without_clips_matches_plain_equations() {
        let varmap = VarMap::new();
        let cell = LstmpCell::new(1, 1, 1, None, None, cpu_vb(&varmap)).unwrap();
        set_gate_weights(&varmap, "weight_hh");
        set_var(
            &varmap,
            "weight_hr",
            Tensor::new(&[[2.0f32]], &Device::Cpu).unwrap(),
        );

        let dev = Device::Cpu;
        let x = Tensor::new(&[[1.5f32]], &dev).unwrap();
        let state = RecState {
            h: Tensor::new(&[[0.3f32]], &dev).unwrap(),
            c: Some(Tensor::new(&[[0.2f32]], &dev).unwrap()),
        };
        let (out, next) = cell.step(&x, &state).unwrap();
        let (c, h) = reference_cell_update(0.2);
        let r = 2.0 * h;
        assert!((scalar_of(&out) - r as f32).abs() < 1e-5);
        assert!((scalar_of(&next.h) - r as f32).abs() < 1e-5);
        assert!((scalar_of(next.c.as_ref().unwrap()) - c as f32).abs() < 1e-5);
    }

    #[test]
    fn lstmp_clips_cell_and_projection() {
        let varmap = VarMap::new();
        let cell = LstmpCell::new(2, 2, 2, Some(1.0), Some(0.05), cpu_vb(&varmap)).unwrap();
        let dev = Device::Cpu;
        set_var(
            &varmap,
            "weight_hr",
            Tensor::new(&[[5.0f32, 0.0], [0.0, 5.0]], &dev).unwrap(),
        );

        // Zero input and zero recurrent state leave all gates at σ(0) = 0.5,
        // so c' = 0.5·c_prev before clipping.
        let x = Tensor::zeros((1, 2), DType::F32, &dev).unwrap();
        let state = RecState {
            h: Tensor::zeros((1, 2), DType::F32, &dev).unwrap(),
            c: Some(Tensor::new(&[[100.0f32, -100.0]], &dev).unwrap()),
        };
        let (out, next) = cell.step(&x, &state).unwrap();

        let c = next.c.unwrap().to_vec2::<f32>().unwrap();
        assert!((c[0][0] - 1.0).abs() < 1e-6);
        assert!((c[0][1] + 1.0).abs() < 1e-6);

        // h = 0.5·tanh(±1) ≈ ±0.3808, so r = ±1.904 clamps to ±0.05.
        let r = out.to_vec2::<f32>().unwrap();
        assert!((r[0][0] - 0.05).abs() < 1e-6);
        assert!((r[0][1] + 0.05).abs() < 1e-6);
    }

    #[test]
    fn bounds_hold_over_a_long_sequence() {
        let varmap = VarMap::new();
        let config = BiLmConfig {
            mode: RnnMode::Lstmp,
            hidden_size: 8,
            projection_size: Some(4),
            cell_clip: Some(0.5),
            projection_clip: Some(0.1),
            ..Default::default()
        };
        let cell = RnnCell::new(&config, 4, cpu_vb(&varmap)).unwrap();

        let mut state = cell.zero_state(3).unwrap();
        for step in 0..20 {
            let x = Tensor::full(((step % 5) as f32) * 10.0, (3, 4), &Device::Cpu).unwrap();
            let (out, next) = cell.step(&x, &state).unwrap();
            for v in out.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
                assert!(v.abs() <= 0.1 + 1e-6);
            }
            for v in next
                .c
                .as_ref()
                .unwrap()
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap()
            {
                assert!(v.abs() <= 0.5 + 1e-6);
            }
            state = next;
        }
    }

    #[test]
    fn zero_state_shapes_per_mode() {
        for (mode, projection) in [
            (RnnMode::RnnTanh, None),
            (RnnMode::RnnRelu, None),
            (RnnMode::Lstm, None),
            (RnnMode::Gru, None),
            (RnnMode::Lstmp, Some(2)),
        ] {
            let varmap = VarMap::new();
            let config = BiLmConfig {
                mode,
                hidden_size: 6,
                projection_size: projection,
                ..Default::default()
            };
            let cell = RnnCell::new(&config, 3, cpu_vb(&varmap)).unwrap();
            let state = cell.zero_state(5).unwrap();
            assert_eq!(state.h.dims(), &[5, cell.output_size()]);
            match mode {
                RnnMode::Lstm => {
                    assert_eq!(state.c.as_ref().unwrap().dims(), &[5, 6]);
                }
                RnnMode::Lstmp => {
                    assert_eq!(cell.output_size(), 2);
                    assert_eq!(state.c.as_ref().unwrap().dims(), &[5, 6]);
                }
                _ => assert!(state.c.is_none()),
            }
        }
    }

    #[test]
    fn lstmp_requires_projection_size() {
        let varmap = VarMap::new();
        let config = BiLmConfig {
            mode: RnnMode::Lstmp,
            projection_size: None,
            ..Default::default()
        };
        assert!(RnnCell::new(&config, 3, cpu_vb(&varmap)).is_err());
    }
}
