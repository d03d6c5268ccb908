//! End-to-end behavior of the circuit simulator

use dynapsim_core::*;
use ndarray::Array3;

fn layout() -> LayoutConstants {
    LayoutConstants::default()
}

fn single_neuron(spec: &CoreSpecification) -> DynapSim {
    DynapSim::from_specification(1, spec, layout(), SimulationParams::default()).unwrap()
}

#[test]
fn bias_extremes() {
    assert_eq!(BiasQuantizer::get_bias(0, 0).unwrap(), 0.0);
    assert_eq!(BiasQuantizer::get_bias(7, 255).unwrap(), COARSE_BASE[7]);

    let table = BiasQuantizer::new();
    let last = table.get_lookup_table().last().copied().unwrap();
    assert_eq!(last.current, COARSE_BASE[7]);
}

#[test]
fn weight_decomposition_example() {
    let mut base = std::collections::HashMap::new();
    base.insert((0u16, 0u16), [1e-6, 2e-6, 4e-6, 8e-6]);
    let composer = WeightComposer::recurrent(base, vec![0]).unwrap();
    let masks = ndarray::array![[0b0011u8]];
    let weights = composer
        .compose_single_channel(&masks, SynapseType::Ampa)
        .unwrap();
    assert_eq!(weights.get(0, 0, SynapseType::Ampa), 3e-6);
}

#[test]
fn subthreshold_membrane_reaches_fixed_point() {
    // Idc well below what is needed to reach Ispkthr
    let spec = CoreSpecification::default().with_idc(1e-11);
    let mut sim = single_neuron(&spec);
    let result = sim.evolve(&Stimulus::silent(2000, 1), true).unwrap();

    assert_eq!(result.total_spikes(), 0.0);
    let imem = &result.record.as_ref().unwrap().imem;
    let last = imem[[1999, 0]];
    let before = imem[[1998, 0]];
    let earlier = imem[[1500, 0]];
    assert!((last - before).abs() / last < 1e-6);
    assert!((last - earlier).abs() / last < 1e-4);
    assert!(last > layout().io && last < spec.ispkthr);
}

/// Euler steps the membrane needs to climb from `Ireset` past `Ispkthr`
/// under a constant `Idc`, ignoring positive feedback and adaptation.
fn charge_steps(params: &CircuitParameters, layout: &LayoutConstants, dt: f64) -> usize {
    let f_tau = layout.f_tau(layout.c_mem);
    let ileak = params.itau_mem[0];
    let ith = ileak * params.f_gain_mem[0];
    let imem_inf = params.f_gain_mem[0] * (params.idc[0] - ileak);

    let mut imem = params.ireset[0];
    let mut steps = 0;
    while imem <= params.ispkthr[0] {
        let tau_prime = f_tau / ileak * (1.0 + ith / imem);
        imem += dt / tau_prime * (imem_inf - imem);
        steps += 1;
        assert!(steps < 1000, "membrane never reaches threshold");
    }
    steps
}

fn spike_times(result: &EvolveResult) -> Vec<usize> {
    result
        .spikes
        .column(0)
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s > 0.0)
        .map(|(t, _)| t)
        .collect()
}

fn assert_tonic_period(params: CircuitParameters, steps: usize) {
    let layout = layout();
    let dt = SimulationParams::default().dt;
    let refractory_steps = (params.t_ref[0] / dt).round() as usize;
    let charge = charge_steps(&params, &layout, dt);
    let period = refractory_steps + charge;

    let mut sim = DynapSim::new(
        layout,
        params,
        WeightTensor::zeros(1, 1),
        SimulationParams::default(),
    )
    .unwrap();
    let result = sim.evolve(&Stimulus::silent(steps, 1), false).unwrap();

    let times = spike_times(&result);
    let intervals: Vec<usize> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(!intervals.is_empty());
    assert!(
        intervals.iter().all(|&isi| isi == period),
        "intervals = {:?}, expected {} ({} refractory + {} charge)",
        intervals,
        period,
        refractory_steps,
        charge
    );

    let predicted = steps as f64 / period as f64;
    let count = result.total_spikes();
    assert!(
        (count - predicted).abs() / predicted < 0.1,
        "count = {}, predicted = {}",
        count,
        predicted
    );
}

#[test]
fn tonic_firing_rate_matches_refractory_period() {
    let layout = layout();
    let spec = CoreSpecification::default()
        .with_idc(1e-5)
        .with_refractory(50e-3);
    let params = CircuitParameters::from_specification(1, &spec, &layout).unwrap();
    assert_eq!(charge_steps(&params, &layout, 1e-3), 2);
    assert_tonic_period(params, 1000);
}

#[test]
fn tonic_firing_at_default_refractory_depends_on_charge_time() {
    // t_ref spans two steps, so the charge time is half of each cycle.
    // The AHP weight sits at the floor to keep the period constant.
    let layout = layout();
    let mut spec = CoreSpecification::default().with_idc(1e-5);
    spec.iw_ahp = layout.io;
    let params = CircuitParameters::from_specification(1, &spec, &layout).unwrap();
    assert_tonic_period(params, 1000);
}

#[test]
fn recurrent_spike_arrives_one_step_later() {
    let layout = layout();
    let spec = CoreSpecification::default();
    let mut params = CircuitParameters::from_specification(2, &spec, &layout).unwrap();

    // neuron 0 fires once on a single strong external spike
    params.iw_syn[[SynapseType::Ampa.index(), 0]] = 1e-3;
    params.ispkthr[0] = 1e-11;
    params.t_ref[0] = 1.0;

    let mut weights = WeightTensor::zeros(2, 2);
    weights.set(0, 1, SynapseType::Ampa, spec.iw_ampa).unwrap();

    let mut sim = DynapSim::new(layout, params, weights, SimulationParams::default()).unwrap();
    let mut input = Array3::zeros((60, 2, NUM_SYNAPSES));
    input[[0, 0, SynapseType::Ampa.index()]] = 1.0;

    let result = sim.evolve(&input, true).unwrap();
    assert_eq!(result.spikes[[0, 0]], 1.0);
    assert_eq!(result.spike_counts()[0], 1.0);
    assert_eq!(result.spike_counts()[1], 0.0);

    let record = result.record.unwrap();
    let ampa = SynapseType::Ampa.index();
    let iampa: Vec<f64> = (0..60).map(|t| record.isyn[[t, 1, ampa]]).collect();

    // no change on the spiking step itself
    assert_eq!(iampa[0], layout.io);
    assert!(iampa[1] > layout.io);

    // afterwards it decays with the current-dependent AMPA time constant
    let ith = layout.tau_to_current(layout.c_ampa, spec.tau_ampa) * spec.r_gain_ampa;
    for t in 1..59 {
        let tau_prime = spec.tau_ampa * (1.0 + ith / iampa[t]);
        let expected = (-1e-3 / tau_prime).exp();
        let ratio = iampa[t + 1] / iampa[t];
        assert!((ratio - expected).abs() < 1e-9, "step {}: {} vs {}", t, ratio, expected);
    }
}

#[test]
fn inhibition_suppresses_tonic_firing() {
    let spec = CoreSpecification::default().with_idc(2e-9);
    let mut excited = single_neuron(&spec);
    let free = excited
        .evolve(&Stimulus::silent(500, 1), false)
        .unwrap()
        .total_spikes();

    let mut inhibited = single_neuron(&spec);
    let input = Stimulus::poisson(500, 1, SynapseType::Gaba, 500.0, 1e-3, 5).unwrap();
    let suppressed = inhibited.evolve(&input, false).unwrap().total_spikes();

    assert!(free > 0.0);
    assert!(suppressed < free);
}

#[test]
fn adaptation_charges_after_each_spike() {
    let spec = CoreSpecification::default().with_idc(1e-5);
    let mut sim = single_neuron(&spec);
    let result = sim.evolve(&Stimulus::silent(100, 1), true).unwrap();
    let record = result.record.unwrap();
    let io = layout().io;

    let first_spike = result
        .spikes
        .column(0)
        .iter()
        .position(|&s| s > 0.0)
        .unwrap();
    assert_eq!(record.iahp[[first_spike, 0]], io);
    assert!(record.iahp[[first_spike + 1, 0]] > io);
}

#[test]
fn device_readback_drives_simulation() {
    let layout = layout();
    let quantizer = BiasQuantizer::new();
    let spec = CoreSpecification::default().with_idc(1e-5);
    let reference = CircuitParameters::from_specification(1, &spec, &layout).unwrap();
    let registers: std::collections::HashMap<_, _> = reference
        .export_registers(0, &quantizer, &layout)
        .unwrap()
        .into_iter()
        .collect();

    let params = CircuitParameters::from_registers(1, &registers, &spec, &layout).unwrap();
    let mut sim = DynapSim::new(
        layout,
        params,
        WeightTensor::zeros(1, 1),
        SimulationParams::default(),
    )
    .unwrap();
    let result = sim.evolve(&Stimulus::silent(200, 1), false).unwrap();
    assert!(result.total_spikes() > 10.0);
}
